use probe::{wait_until_ready, HttpProbe, Probe, ProbeConfig, ProbeError, ReadinessPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers 503 to the first `unavailable_for` requests, then 200
async fn spawn_warming_server(unavailable_for: u32) -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let status = if hit <= unavailable_for {
                "503 Service Unavailable"
            } else {
                "200 OK"
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                status
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/", addr), hits)
}

fn make_probe(url: &str) -> HttpProbe {
    HttpProbe::new(
        ProbeConfig::new()
            .with_url(url)
            .with_request_timeout(REQUEST_TIMEOUT),
    )
    .expect("probe creation")
}

#[tokio::test]
async fn test_waits_through_warmup() {
    let (url, hits) = spawn_warming_server(2).await;
    let probe = make_probe(&url);
    let policy = ReadinessPolicy::new(
        Duration::ZERO,
        Duration::from_millis(20),
        Duration::from_secs(5),
    );

    let report = wait_until_ready(&probe, &policy).await.unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(report.response.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gives_up_when_service_never_recovers() {
    let (url, _hits) = spawn_warming_server(u32::MAX).await;
    let probe = make_probe(&url);
    let policy = ReadinessPolicy::new(
        Duration::ZERO,
        Duration::from_millis(20),
        Duration::from_millis(150),
    );

    let err = wait_until_ready(&probe, &policy).await.unwrap_err();
    match err {
        ProbeError::NotReady {
            target, last_error, ..
        } => {
            assert_eq!(target, url);
            assert!(last_error.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[ignore]
async fn test_local_backend_is_up() {
    let probe = make_probe("http://localhost:8000/");
    let response = probe.check().await.expect("backend probe failed");
    assert!(response.status < 400);
}

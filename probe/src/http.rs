use crate::config::ProbeConfig;
use crate::provider::{Probe, ProbeError, ProbeResult};
use crate::types::ProbeResponse;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;
use tracing::debug;

/// GETs a URL; any status below 400 counts as healthy, matching `curl -f`
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    config: ProbeConfig,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> ProbeResult<Self> {
        config
            .validate()
            .map_err(|message| ProbeError::InvalidConfig { message })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProbeError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> ProbeResult<ProbeResponse> {
        let started = Instant::now();
        let response = self.client.get(&self.config.url).send().await?;
        let status = response.status();
        let latency = started.elapsed();

        debug!("GET {} -> {} in {:?}", self.config.url, status, latency);

        if status.is_client_error() || status.is_server_error() {
            return Err(ProbeError::UnhealthyStatus {
                target: self.config.url.clone(),
                status: status.as_u16(),
            });
        }

        Ok(ProbeResponse::new(status.as_u16(), latency))
    }

    fn target(&self) -> &str {
        &self.config.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/", addr)
    }

    fn probe_for(url: &str) -> HttpProbe {
        HttpProbe::new(
            ProbeConfig::new()
                .with_url(url)
                .with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HttpProbe::new(ProbeConfig::new().with_url("localhost:8000"));
        assert!(matches!(result, Err(ProbeError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_success_status() {
        let url = serve_status("200 OK").await;
        let probe = probe_for(&url);
        let response = probe.check().await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(probe.target(), url);
    }

    #[tokio::test]
    async fn test_error_status_is_unhealthy() {
        let url = serve_status("502 Bad Gateway").await;
        let err = probe_for(&url).check().await.unwrap_err();
        assert!(matches!(err, ProbeError::UnhealthyStatus { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = probe_for(&format!("http://{}/", addr))
            .check()
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Network(_)));
    }
}

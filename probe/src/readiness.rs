//! Bounded polling until a probe target answers.
//!
//! Replaces a fixed post-start sleep: the caller states how long it is
//! willing to wait and how often to ask, and gets back either the first
//! healthy response or the last failure once the budget is spent.

use crate::config::ReadinessPolicy;
use crate::provider::{Probe, ProbeError, ProbeResult};
use crate::types::ReadinessReport;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub async fn wait_until_ready(
    probe: &dyn Probe,
    policy: &ReadinessPolicy,
) -> ProbeResult<ReadinessReport> {
    let start_time = Instant::now();
    let mut attempts = 0u32;

    if !policy.grace.is_zero() {
        debug!("Waiting {:?} before probing {}", policy.grace, probe.target());
        sleep(policy.grace).await;
    }

    loop {
        attempts += 1;

        match probe.check().await {
            Ok(response) => {
                let report = ReadinessReport {
                    target: probe.target().to_string(),
                    attempts,
                    elapsed: start_time.elapsed(),
                    response,
                };
                info!("{}", report);
                return Ok(report);
            }
            Err(e) => {
                let elapsed = start_time.elapsed();
                if elapsed + policy.interval >= policy.timeout {
                    warn!(
                        "{} still failing after {} attempt(s): {}",
                        probe.target(),
                        attempts,
                        e
                    );
                    return Err(ProbeError::NotReady {
                        target: probe.target().to_string(),
                        attempts,
                        waited: elapsed,
                        last_error: e.to_string(),
                    });
                }

                debug!(
                    "{} not ready (attempt {}), retrying in {:?}: {}",
                    probe.target(),
                    attempts,
                    policy.interval,
                    e
                );
                sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails until `healthy_after` calls have been made
    struct FlakyProbe {
        calls: AtomicU32,
        healthy_after: u32,
    }

    impl FlakyProbe {
        fn new(healthy_after: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                healthy_after,
            }
        }
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn check(&self) -> ProbeResult<ProbeResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.healthy_after {
                Ok(ProbeResponse::new(200, Duration::from_millis(1)))
            } else {
                Err(ProbeError::UnhealthyStatus {
                    target: "flaky".to_string(),
                    status: 503,
                })
            }
        }

        fn target(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(timeout_ms: u64) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::ZERO,
            Duration::from_millis(5),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let probe = FlakyProbe::new(1);
        let report = wait_until_ready(&probe, &fast_policy(100)).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.response.status, 200);
        assert_eq!(report.target, "flaky");
    }

    #[tokio::test]
    async fn test_ready_after_retries() {
        let probe = FlakyProbe::new(3);
        let report = wait_until_ready(&probe, &fast_policy(2_000)).await.unwrap();
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn test_times_out_with_last_error() {
        let probe = FlakyProbe::new(u32::MAX);
        let err = wait_until_ready(&probe, &fast_policy(30)).await.unwrap_err();
        match err {
            ProbeError::NotReady {
                attempts,
                last_error,
                ..
            } => {
                assert!(attempts >= 1);
                assert!(last_error.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_once_policy_makes_single_attempt() {
        let probe = FlakyProbe::new(2);
        let result = wait_until_ready(&probe, &ReadinessPolicy::once()).await;
        assert!(result.is_err());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grace_period_is_honoured() {
        let probe = FlakyProbe::new(1);
        let policy = ReadinessPolicy::new(
            Duration::from_millis(20),
            Duration::from_millis(5),
            Duration::from_millis(500),
        );
        let report = tokio_test::block_on(wait_until_ready(&probe, &policy)).unwrap();
        assert!(report.elapsed >= Duration::from_millis(20));
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one successful probe attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub latency: Duration,
}

impl ProbeResponse {
    pub fn new(status: u16, latency: Duration) -> Self {
        Self { status, latency }
    }
}

/// Outcome of waiting for a target to become ready
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub target: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub response: ProbeResponse,
}

impl std::fmt::Display for ReadinessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} answered {} after {} attempt(s) in {}ms",
            self.target,
            self.response.status,
            self.attempts,
            self.elapsed.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = ReadinessReport {
            target: "http://localhost:8000/".to_string(),
            attempts: 3,
            elapsed: Duration::from_millis(4200),
            response: ProbeResponse::new(200, Duration::from_millis(12)),
        };
        assert_eq!(
            report.to_string(),
            "http://localhost:8000/ answered 200 after 3 attempt(s) in 4200ms"
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = ReadinessReport {
            target: "proxy".to_string(),
            attempts: 1,
            elapsed: Duration::from_millis(5),
            response: ProbeResponse::new(204, Duration::from_millis(5)),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["response"]["status"], 204);
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub url: String,
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Probe URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Probe URL must start with http:// or https://".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// How long to wait for a target and how often to ask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Delay before the first attempt
    pub grace: Duration,
    /// Delay between failed attempts
    pub interval: Duration,
    /// Upper bound on the whole wait, grace included
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ReadinessPolicy {
    pub fn new(grace: Duration, interval: Duration, timeout: Duration) -> Self {
        Self {
            grace,
            interval,
            timeout,
        }
    }

    /// A single attempt with no waiting, for one-shot checks
    pub fn once() -> Self {
        Self {
            grace: Duration::ZERO,
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.grace > self.timeout {
            return Err("Grace period cannot exceed the readiness timeout".to_string());
        }

        if self.interval.is_zero() && !self.timeout.is_zero() {
            return Err("Poll interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

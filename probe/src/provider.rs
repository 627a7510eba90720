use crate::types::ProbeResponse;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("{target} answered with error status {status}")]
    UnhealthyStatus { target: String, status: u16 },

    #[error("{target} not ready after {attempts} attempt(s) over {}s: {last_error}", .waited.as_secs())]
    NotReady {
        target: String,
        attempts: u32,
        waited: Duration,
        last_error: String,
    },
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// A single readiness check against one target
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> ProbeResult<ProbeResponse>;

    /// Human readable target, usually the URL
    fn target(&self) -> &str;
}

pub mod config;
pub mod http;
pub mod provider;
pub mod readiness;
pub mod types;

pub use config::{ProbeConfig, ReadinessPolicy};
pub use http::HttpProbe;
pub use provider::{Probe, ProbeError, ProbeResult};
pub use readiness::wait_until_ready;
pub use types::{ProbeResponse, ReadinessReport};

//! Redeploys the FIFA Rivalry Tracker stack on a single host.
//!
//! The [`workflow::Deployer`] drives the sequence; everything it touches on
//! the host goes through a [`container::CommandRunner`], a
//! [`source::SourceSync`] or a [`probe::Probe`], so the whole sequence can be
//! exercised with fakes.

pub mod config;
pub mod container;
pub mod envfile;
pub mod lock;
pub mod proxy;
pub mod report;
pub mod source;
pub mod workflow;

pub use config::{ConfigError, DeployConfig, ReadinessSettings, RuntimeChoice};
pub use container::{
    detect_runtime, resolve_runtime, CommandOutput, CommandRunner, ContainerError,
    ContainerRuntime, SystemRunner,
};
pub use envfile::{verify_env_file, DeploySecrets, EnvFile, EnvFileError, Redactor};
pub use lock::{force_unlock, read_owner, DeployLock, LockError, LockOwner};
pub use proxy::{ProxyActivation, ProxyError, ProxyManager, ProxySettings};
pub use report::{DeployReport, DeployStage, RunOutcome, StageRecord, StageStatus};
pub use source::{CheckoutState, GitSource, SourceError, SourceResult, SourceSync};
pub use workflow::{DeployError, DeployPlan, DeployResult, Deployer, PlannedStage};

//! nginx reverse proxy installation and supervision

use crate::container::{CommandRunner, ContainerError};
use compose::CommandSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy setup script not found at {0}")]
    SetupScriptMissing(PathBuf),

    #[error("Proxy setup script failed: {0}")]
    SetupFailed(#[source] ContainerError),

    #[error("Proxy configuration test failed: {output}")]
    ConfigInvalid { output: String },

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Where the proxy's pieces live on the deploy host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Setup helper, relative to the checkout
    pub setup_script: PathBuf,
    /// Interpreter plus leading arguments used to run the helper
    pub shell: Vec<String>,
    /// Prefix for privileged commands, e.g. `["sudo", "-n"]`
    pub privilege: Vec<String>,
    /// systemd unit name
    pub service: String,
    pub error_log: PathBuf,
    pub access_log: PathBuf,
    /// Lines of each log to collect on failure
    pub log_tail: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            setup_script: PathBuf::from("scripts/setup_nginx.sh"),
            shell: vec!["bash".to_string()],
            privilege: Vec::new(),
            service: "nginx".to_string(),
            error_log: PathBuf::from("/var/log/nginx/error.log"),
            access_log: PathBuf::from("/var/log/nginx/access.log"),
            log_tail: 50,
        }
    }
}

impl ProxySettings {
    fn privileged(&self, program: &str) -> CommandSpec {
        match self.privilege.split_first() {
            Some((first, rest)) => CommandSpec::new(first).args(rest.iter().cloned()).arg(program),
            None => CommandSpec::new(program),
        }
    }

    pub fn setup_command(&self, checkout: &Path) -> CommandSpec {
        let mut parts = self.privilege.iter().chain(self.shell.iter()).cloned();
        let program = parts.next().unwrap_or_else(|| "bash".to_string());
        CommandSpec::new(program)
            .args(parts)
            .arg(self.setup_script.display().to_string())
            .in_dir(checkout)
    }

    pub fn test_command(&self) -> CommandSpec {
        self.privileged("nginx").arg("-t")
    }

    pub fn is_active_command(&self) -> CommandSpec {
        self.privileged("systemctl")
            .args(["is-active", "--quiet"])
            .arg(&self.service)
    }

    pub fn start_command(&self) -> CommandSpec {
        self.privileged("systemctl").arg("start").arg(&self.service)
    }

    pub fn tail_command(&self, log: &Path) -> CommandSpec {
        self.privileged("tail")
            .arg("-n")
            .arg(self.log_tail.to_string())
            .arg(log.display().to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.shell.is_empty() {
            return Err("proxy.shell cannot be empty".to_string());
        }
        if self.service.is_empty() {
            return Err("proxy.service cannot be empty".to_string());
        }
        if self.log_tail == 0 {
            return Err("proxy.log_tail must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Outcome of making sure the proxy service runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ProxyActivation {
    AlreadyActive,
    Started,
    StartFailed(String),
}

pub struct ProxyManager<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a ProxySettings,
    checkout: &'a Path,
}

impl<'a> ProxyManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a ProxySettings, checkout: &'a Path) -> Self {
        Self {
            runner,
            settings,
            checkout,
        }
    }

    /// Run the setup helper from the checkout
    pub fn install(&self) -> ProxyResult<()> {
        let script = self.checkout.join(&self.settings.setup_script);
        if !script.is_file() {
            return Err(ProxyError::SetupScriptMissing(script));
        }

        info!("Installing proxy configuration via {}", script.display());
        self.runner
            .run_checked(&self.settings.setup_command(self.checkout))
            .map_err(ProxyError::SetupFailed)?;
        Ok(())
    }

    /// `nginx -t`
    pub fn test_config(&self) -> ProxyResult<()> {
        let output = self.runner.run(&self.settings.test_command())?;
        if output.is_success() {
            info!("Proxy configuration syntax is valid");
            Ok(())
        } else {
            Err(ProxyError::ConfigInvalid {
                output: output.combined(),
            })
        }
    }

    /// Start the service when it is not running; failure to start is reported, not raised
    pub fn ensure_active(&self) -> ProxyResult<ProxyActivation> {
        if self.runner.run(&self.settings.is_active_command())?.is_success() {
            return Ok(ProxyActivation::AlreadyActive);
        }

        warn!("{} is not active, starting it", self.settings.service);
        let output = self.runner.run(&self.settings.start_command())?;
        if output.is_success() {
            info!("{} started", self.settings.service);
            Ok(ProxyActivation::Started)
        } else {
            let reason = output.combined();
            warn!("Failed to start {}: {}", self.settings.service, reason);
            Ok(ProxyActivation::StartFailed(reason))
        }
    }

    /// Tails of the error and access logs
    pub fn diagnostics(&self) -> Vec<(String, String)> {
        [&self.settings.error_log, &self.settings.access_log]
            .into_iter()
            .map(|log| {
                let text = match self.runner.run(&self.settings.tail_command(log)) {
                    Ok(output) => output.combined(),
                    Err(e) => e.to_string(),
                };
                (log.display().to_string(), text)
            })
            .collect()
    }
}

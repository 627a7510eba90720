//! Deploy configuration loaded from TOML
//!
//! Every field has a default matching the production host, so an empty file
//! (or no file at all) describes the standard deploy. Secrets never live here;
//! they come from the process environment, see [`crate::envfile`].

use crate::container::ContainerRuntime;
use crate::proxy::ProxySettings;
use compose::{ComposeProject, Stack};
use probe::{ProbeConfig, ReadinessPolicy};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which container runtime to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeChoice {
    #[default]
    Docker,
    Podman,
    /// Use whichever has a working compose plugin
    Auto,
}

impl RuntimeChoice {
    pub fn requested(&self) -> Option<ContainerRuntime> {
        match self {
            RuntimeChoice::Docker => Some(ContainerRuntime::Docker),
            RuntimeChoice::Podman => Some(ContainerRuntime::Podman),
            RuntimeChoice::Auto => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub grace_secs: u64,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            grace_secs: 5,
            interval_secs: 2,
            timeout_secs: 120,
            request_timeout_secs: 5,
        }
    }
}

impl ReadinessSettings {
    pub fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::from_secs(self.grace_secs),
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.timeout_secs),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Checkout the stack is built from
    pub work_dir: PathBuf,
    pub repo_url: String,
    pub branch: String,
    /// Env file name, relative to `work_dir`
    pub env_file: PathBuf,
    pub runtime: RuntimeChoice,
    /// Compose manifests, relative to `work_dir`; empty means compose's default lookup
    pub compose_files: Vec<PathBuf>,
    pub project_name: Option<String>,
    /// Defaults to `<work_dir>.deploy.lock`
    pub lock_file: Option<PathBuf>,
    /// Host the published ports are probed on
    pub probe_host: String,
    pub proxy_url: String,
    /// Stop and remove every container on the host during teardown
    pub force_remove_containers: bool,
    /// `system prune -af --volumes` during teardown
    pub prune_system: bool,
    /// Lines of compose logs collected when the app does not come up
    pub diagnostics_tail: usize,
    pub readiness: ReadinessSettings,
    pub proxy: ProxySettings,
    pub stack: Stack,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/srv/fifa-rivalry-tracker"),
            repo_url: "https://github.com/fifa-rivalry-tracker/fifa-rivalry-tracker.git"
                .to_string(),
            branch: "main".to_string(),
            env_file: PathBuf::from(".env"),
            runtime: RuntimeChoice::default(),
            compose_files: Vec::new(),
            project_name: None,
            lock_file: None,
            probe_host: "localhost".to_string(),
            proxy_url: "http://localhost:80/".to_string(),
            force_remove_containers: true,
            prune_system: true,
            diagnostics_tail: 100,
            readiness: ReadinessSettings::default(),
            proxy: ProxySettings::default(),
            stack: Stack::default(),
        }
    }
}

impl DeployConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` when given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.work_dir.file_name().is_none() || self.work_dir.parent().is_none() {
            return invalid("work_dir must name a directory below the filesystem root".into());
        }
        if self.repo_url.is_empty() {
            return invalid("repo_url cannot be empty".into());
        }
        if self.branch.is_empty() {
            return invalid("branch cannot be empty".into());
        }
        if self.env_file.as_os_str().is_empty() || self.env_file.is_absolute() {
            return invalid("env_file must be a relative file name".into());
        }
        if self.probe_host.is_empty() {
            return invalid("probe_host cannot be empty".into());
        }
        if self.diagnostics_tail == 0 {
            return invalid("diagnostics_tail must be greater than 0".into());
        }
        if self.readiness.request_timeout_secs == 0 {
            return invalid("readiness.request_timeout_secs must be greater than 0".into());
        }

        self.readiness
            .policy()
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.proxy.validate().map_err(ConfigError::Invalid)?;
        self.stack
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.proxy_probe_config()
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.compose_project(ContainerRuntime::Docker)
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    pub fn env_path(&self) -> PathBuf {
        self.work_dir.join(&self.env_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        match &self.lock_file {
            Some(path) => path.clone(),
            None => {
                // sibling of the checkout, whatever separators trail `work_dir`
                let mut name = self
                    .work_dir
                    .file_name()
                    .map(OsString::from)
                    .unwrap_or_default();
                name.push(".deploy.lock");
                match self.work_dir.parent() {
                    Some(parent) => parent.join(name),
                    None => PathBuf::from(name),
                }
            }
        }
    }

    pub fn compose_project(&self, runtime: ContainerRuntime) -> ComposeProject {
        let mut project = ComposeProject::new(runtime.command(), &self.work_dir)
            .with_env_file(&self.env_file);
        for file in &self.compose_files {
            project = project.with_file(file);
        }
        if let Some(name) = &self.project_name {
            project = project.with_project_name(name);
        }
        project
    }

    /// One probe per stack service that declares a health path
    pub fn app_probe_configs(&self) -> Vec<ProbeConfig> {
        self.stack
            .probed_services()
            .map(|service| {
                ProbeConfig::new()
                    .with_url(service.published_url(&self.probe_host))
                    .with_request_timeout(self.readiness.request_timeout())
            })
            .collect()
    }

    pub fn proxy_probe_config(&self) -> ProbeConfig {
        ProbeConfig::new()
            .with_url(&self.proxy_url)
            .with_request_timeout(self.readiness.request_timeout())
    }

    pub fn app_readiness(&self) -> ReadinessPolicy {
        self.readiness.policy()
    }

    /// The proxy was just (re)started; no grace period before probing it
    pub fn proxy_readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            grace: Duration::ZERO,
            ..self.readiness.policy()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = DeployConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.branch, "main");
        assert_eq!(
            config.env_path(),
            PathBuf::from("/srv/fifa-rivalry-tracker/.env")
        );
        assert_eq!(
            config.lock_path(),
            PathBuf::from("/srv/fifa-rivalry-tracker.deploy.lock")
        );
        assert_eq!(config.readiness.policy().timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_lock_sits_beside_checkout_with_trailing_separator() {
        let dir = tempfile::TempDir::new().unwrap();
        let work_dir = dir.path().join("app");
        let toml = format!("work_dir = \"{}/\"", work_dir.display());
        let config = DeployConfig::from_toml_str(&toml).unwrap();

        assert_eq!(config.lock_path(), dir.path().join("app.deploy.lock"));
        assert!(!config.lock_path().starts_with(&work_dir));
        assert_eq!(config.env_path(), work_dir.join(".env"));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = DeployConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeployConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = DeployConfig::from_toml_str(
            r#"
            work_dir = "/home/deploy/fifa-rivalry-tracker"
            runtime = "auto"
            compose_files = ["docker-compose.prod.yml"]
            project_name = "rivalry"
            prune_system = false

            [readiness]
            timeout_secs = 60

            [proxy]
            privilege = ["sudo", "-n"]
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime, RuntimeChoice::Auto);
        assert_eq!(config.runtime.requested(), None);
        assert!(!config.prune_system);
        assert_eq!(config.readiness.timeout_secs, 60);
        assert_eq!(config.readiness.interval_secs, 2);
        assert_eq!(config.proxy.service, "nginx");
        assert_eq!(config.proxy.privilege, vec!["sudo", "-n"]);

        let project = config.compose_project(ContainerRuntime::Docker);
        assert!(project
            .down_all()
            .has_args(&["-f", "docker-compose.prod.yml", "-p", "rivalry"]));
        assert_eq!(
            project.project_dir(),
            Path::new("/home/deploy/fifa-rivalry-tracker")
        );
    }

    #[test]
    fn test_alternate_backend_port() {
        let config = DeployConfig::from_toml_str(
            r#"
            [[stack.services]]
            name = "backend"
            kind = "backend"
            container_port = 8000
            published_port = 3000
            health_path = "/"

            [[stack.services]]
            name = "mongodb"
            kind = "database"
            container_port = 27017
            published_port = 27017
            "#,
        )
        .unwrap();

        let probes = config.app_probe_configs();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].url, "http://localhost:3000/");
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "branch = \"\"",
            "env_file = \"/etc/rivalry.env\"",
            "work_dir = \"/\"",
            "work_dir = \"/srv/app/..\"",
            "proxy_url = \"localhost\"",
            "project_name = \"Not Valid\"",
            "[readiness]\ngrace_secs = 500",
            "[proxy]\nlog_tail = 0",
        ];
        for case in cases {
            let result = DeployConfig::from_toml_str(case);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "expected invalid config for {case:?}"
            );
        }
    }

    #[test]
    fn test_unknown_runtime_is_parse_error() {
        assert!(matches!(
            DeployConfig::from_toml_str("runtime = \"containerd\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "branch = \"release\"").unwrap();
        let config = DeployConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.branch, "release");

        let missing = DeployConfig::from_file(Path::new("/nonexistent/deploy.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_proxy_readiness_has_no_grace() {
        let config = DeployConfig::default();
        assert_eq!(config.proxy_readiness().grace, Duration::ZERO);
        assert_eq!(config.app_readiness().grace, Duration::from_secs(5));
    }
}

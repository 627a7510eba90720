//! Compose project utilities for rivalry-deploy
//!
//! This crate builds the command lines used to tear down and rebuild the
//! FIFA Rivalry Tracker stack (backend, frontend dashboard and MongoDB) with
//! `docker compose` or `podman compose`. It never executes anything itself;
//! callers hand the resulting [`CommandSpec`]s to a runner.

pub mod stack;

pub use stack::{ServiceKind, Stack, StackService};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors related to compose project configuration
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ComposeResult<T> = Result<T, ComposeError>;

/// A single external command: program, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Whether the argument list contains `needle` as a contiguous run
    pub fn has_args(&self, needle: &[&str]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.args
            .windows(needle.len())
            .any(|window| window.iter().zip(needle).all(|(a, b)| a == b))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// A compose project rooted at the deploy checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeProject {
    /// Container runtime binary (`docker` or `podman`)
    pub runtime_command: String,
    /// Directory the compose commands run in
    pub project_dir: PathBuf,
    /// Manifest files passed with `-f`, relative to `project_dir`
    pub files: Vec<PathBuf>,
    /// Project name passed with `-p`
    pub project_name: Option<String>,
    /// Env file passed with `--env-file`
    pub env_file: Option<PathBuf>,
}

impl ComposeProject {
    pub fn new(runtime_command: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_command: runtime_command.into(),
            project_dir: project_dir.into(),
            files: Vec::new(),
            project_name: None,
            env_file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn validate(&self) -> ComposeResult<()> {
        if self.runtime_command.is_empty() {
            return Err(ComposeError::InvalidConfig(
                "runtime command cannot be empty".to_string(),
            ));
        }
        if let Some(name) = &self.project_name {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
                && name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if !valid {
                return Err(ComposeError::InvalidConfig(format!(
                    "project name '{}' must be lowercase alphanumeric, '-' or '_'",
                    name
                )));
            }
        }
        Ok(())
    }

    fn compose(&self) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.runtime_command)
            .arg("compose")
            .in_dir(&self.project_dir);
        for file in &self.files {
            cmd = cmd.arg("-f").arg(file.display().to_string());
        }
        if let Some(name) = &self.project_name {
            cmd = cmd.arg("-p").arg(name);
        }
        if let Some(env_file) = &self.env_file {
            cmd = cmd.arg("--env-file").arg(env_file.display().to_string());
        }
        cmd
    }

    fn runtime(&self) -> CommandSpec {
        CommandSpec::new(&self.runtime_command)
    }

    /// `compose config --quiet`: validates the manifests without touching containers
    pub fn validate_manifest(&self) -> CommandSpec {
        self.compose().args(["config", "--quiet"])
    }

    /// Removes containers, networks, named volumes and every image the project uses
    pub fn down_all(&self) -> CommandSpec {
        self.compose()
            .args(["down", "--remove-orphans", "--volumes", "--rmi", "all"])
    }

    pub fn build_no_cache(&self) -> CommandSpec {
        self.compose().args(["build", "--no-cache"])
    }

    pub fn up_force_recreate(&self) -> CommandSpec {
        self.compose().args(["up", "-d", "--force-recreate"])
    }

    pub fn ps_all(&self) -> CommandSpec {
        self.compose().args(["ps", "-a"])
    }

    pub fn logs(&self, tail: usize) -> CommandSpec {
        self.compose()
            .args(["logs", "--no-color", "--tail"])
            .arg(tail.to_string())
    }

    /// Every container on the host, running or not, one id per line
    pub fn list_all_containers(&self) -> CommandSpec {
        self.runtime().args(["ps", "-aq"])
    }

    pub fn stop_containers(&self, ids: &[String]) -> CommandSpec {
        self.runtime().arg("stop").args(ids.iter().cloned())
    }

    pub fn remove_containers(&self, ids: &[String]) -> CommandSpec {
        self.runtime().args(["rm", "-f"]).args(ids.iter().cloned())
    }

    pub fn system_prune(&self) -> CommandSpec {
        self.runtime().args(["system", "prune", "-af", "--volumes"])
    }

    pub fn prune_dangling_images(&self) -> CommandSpec {
        self.runtime().args(["image", "prune", "-f"])
    }
}

/// Parse the output of `ps -q`/`ps -aq` into container ids
pub fn parse_container_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

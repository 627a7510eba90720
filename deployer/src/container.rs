use compose::CommandSpec;
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Container runtime types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
    /// No container runtime available
    None,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::None => "",
        }
    }

    /// Check if this runtime is available
    pub fn is_available(&self) -> bool {
        matches!(self, ContainerRuntime::Docker | ContainerRuntime::Podman)
    }
}

/// Errors raised while running external commands
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No container runtime is available
    #[error("No container runtime available. Please install Docker or Podman on the deploy host.")]
    NoRuntimeAvailable,

    /// The command could not be spawned at all
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero
    #[error("Command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("status {}", code),
            None => "a signal".to_string(),
        }
    }

    /// stdout and stderr joined, for diagnostics
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Executes external commands on the deploy host
pub trait CommandRunner: Send + Sync {
    /// Run to completion; a non-zero exit is reported in the output, not as an error
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ContainerError>;

    /// Run and turn a non-zero exit into [`ContainerError::CommandFailed`]
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, ContainerError> {
        let output = self.run(spec)?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ContainerError::CommandFailed {
                command: spec.to_string(),
                status: output.status_text(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands with `std::process::Command`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ContainerError> {
        debug!("Running: {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| ContainerError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Detect an available container runtime with a working compose plugin
pub fn detect_runtime(runner: &dyn CommandRunner) -> ContainerRuntime {
    for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
        let probe = CommandSpec::new(runtime.command()).args(["compose", "version"]);
        if runner.run(&probe).is_ok_and(|output| output.is_success()) {
            return runtime;
        }
    }

    ContainerRuntime::None
}

/// Resolve the configured runtime, detecting one when asked to
pub fn resolve_runtime(
    requested: Option<ContainerRuntime>,
    runner: &dyn CommandRunner,
) -> Result<ContainerRuntime, ContainerError> {
    let runtime = match requested {
        Some(runtime) => runtime,
        None => detect_runtime(runner),
    };

    if runtime.is_available() {
        Ok(runtime)
    } else {
        Err(ContainerError::NoRuntimeAvailable)
    }
}

//! Per-run record of what the deployer did

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Steps of a deploy, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
    Lock,
    SyncSource,
    WriteEnvFile,
    ValidateManifest,
    Teardown,
    Rebuild,
    WaitForApp,
    InstallProxy,
    TestProxyConfig,
    EnsureProxyActive,
    ProbeProxy,
    Cleanup,
}

impl std::fmt::Display for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeployStage::Lock => "lock",
            DeployStage::SyncSource => "sync source",
            DeployStage::WriteEnvFile => "write env file",
            DeployStage::ValidateManifest => "validate manifest",
            DeployStage::Teardown => "teardown",
            DeployStage::Rebuild => "rebuild",
            DeployStage::WaitForApp => "wait for app",
            DeployStage::InstallProxy => "install proxy",
            DeployStage::TestProxyConfig => "test proxy config",
            DeployStage::EnsureProxyActive => "ensure proxy active",
            DeployStage::ProbeProxy => "probe proxy",
            DeployStage::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Something went wrong but the stage handled it
    Recovered,
    /// Nothing to do for this stage
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: DeployStage,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub run_id: Uuid,
    /// `deploy`, `setup-proxy` or `check`
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub commit: Option<String>,
    pub outcome: RunOutcome,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeployReport {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind: kind.into(),
            started_at: Utc::now(),
            finished_at: None,
            commit: None,
            outcome: RunOutcome::InProgress,
            stages: Vec::new(),
            error: None,
        }
    }

    pub fn record(
        &mut self,
        stage: DeployStage,
        status: StageStatus,
        started: Instant,
        detail: Option<String>,
    ) {
        self.stages.push(StageRecord {
            stage,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
        });
    }

    pub fn stage(&self, stage: DeployStage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn executed(&self) -> Vec<DeployStage> {
        self.stages.iter().map(|r| r.stage).collect()
    }

    pub fn finish(&mut self, error: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.outcome = if error.is_some() {
            RunOutcome::Failed
        } else {
            RunOutcome::Succeeded
        };
        self.error = error;
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, body)
    }

    /// One line per stage, for the terminal
    pub fn summary(&self) -> String {
        let mut out = format!("{} run {}: {:?}\n", self.kind, self.run_id, self.outcome);
        if let Some(commit) = &self.commit {
            out.push_str(&format!("  commit {}\n", commit));
        }
        for record in &self.stages {
            let mark = match record.status {
                StageStatus::Succeeded => "ok",
                StageStatus::Recovered => "recovered",
                StageStatus::Skipped => "skipped",
                StageStatus::Failed => "FAILED",
            };
            out.push_str(&format!(
                "  {:<20} {:<9} {:>7}ms\n",
                record.stage.to_string(),
                mark,
                record.duration_ms
            ));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("  error: {}\n", error));
        }
        out
    }
}

//! Mutual exclusion between deploy runs on one host
//!
//! Two CI triggers landing close together would otherwise reset the same
//! checkout and tear down each other's containers. The lock is a file created
//! with `create_new` next to the working directory, so it exists even before
//! the first clone. It is removed when the guard is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another deploy holds {path}: {holder}")]
    Held { path: PathBuf, holder: String },

    #[error("IO error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type LockResult<T> = Result<T, LockError>;

/// Who holds the lock, written into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub run_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} (pid {}) since {}",
            self.run_id,
            self.pid,
            self.acquired_at.to_rfc3339()
        )
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    owner: LockOwner,
}

impl DeployLock {
    pub fn acquire(path: impl Into<PathBuf>, run_id: Uuid) -> LockResult<Self> {
        let path = path.into();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let owner = LockOwner {
            pid: std::process::id(),
            run_id,
            acquired_at: Utc::now(),
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = read_owner(&path)
                    .map(|owner| owner.to_string())
                    .unwrap_or_else(|| "unknown holder".to_string());
                return Err(LockError::Held {
                    path: path.clone(),
                    holder,
                });
            }
            Err(e) => return Err(io_err(e)),
        };

        let body = serde_json::to_vec(&owner)
            .map_err(|e| io_err(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        if let Err(e) = file.write_all(&body) {
            let _ = fs::remove_file(&path);
            return Err(io_err(e));
        }

        info!("Acquired deploy lock {}", path.display());
        Ok(Self { path, owner })
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Released deploy lock {}", self.path.display()),
            Err(e) => warn!("Failed to release deploy lock {}: {}", self.path.display(), e),
        }
    }
}

/// Read the owner recorded in a lock file, if it exists and parses
pub fn read_owner(path: &Path) -> Option<LockOwner> {
    let body = fs::read(path).ok()?;
    serde_json::from_slice(&body).ok()
}

/// Remove a lock left behind by a crashed run; returns the owner it recorded
pub fn force_unlock(path: &Path) -> LockResult<Option<LockOwner>> {
    let owner = read_owner(path);
    match fs::remove_file(path) {
        Ok(()) => {
            warn!("Removed deploy lock {}", path.display());
            Ok(owner)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.lock");
        let run_id = Uuid::new_v4();

        {
            let lock = DeployLock::acquire(&path, run_id).unwrap();
            assert!(path.exists());
            assert_eq!(lock.owner().run_id, run_id);
            assert_eq!(read_owner(&path).unwrap().pid, std::process::id());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.lock");
        let first_run = Uuid::new_v4();

        let _held = DeployLock::acquire(&path, first_run).unwrap();
        let err = DeployLock::acquire(&path, Uuid::new_v4()).unwrap_err();

        match err {
            LockError::Held { holder, .. } => assert!(holder.contains(&first_run.to_string())),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_lock_file_still_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.lock");
        fs::write(&path, "not json").unwrap();

        let err = DeployLock::acquire(&path, Uuid::new_v4()).unwrap_err();
        assert!(err.to_string().contains("unknown holder"));
    }

    #[test]
    fn test_force_unlock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.lock");
        let run_id = Uuid::new_v4();

        let lock = DeployLock::acquire(&path, run_id).unwrap();
        std::mem::forget(lock);

        let owner = force_unlock(&path).unwrap().unwrap();
        assert_eq!(owner.run_id, run_id);
        assert!(!path.exists());
        assert!(force_unlock(&path).unwrap().is_none());

        assert!(DeployLock::acquire(&path, Uuid::new_v4()).is_ok());
    }
}

//! Process lock file — a filesystem mutex guarding exclusive
//! attachment to the decision channel.
//!
//! Contract: fail fast if already held, remove on clean shutdown,
//! tolerate manual removal after a crash. No liveness TTL — recovery
//! after a crash is an operator removing the file.

use chrono::{DateTime, Utc};
use clipcast_core::error::{ClipcastError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stored lock contents: who holds the channel and since when.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLock {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
}

/// An acquired lock. Release explicitly on shutdown; dropping without
/// releasing leaves the file behind, same as a crash.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock, failing with `LockHeld` (reporting the holder's
    /// pid and start time) if a lock file already exists.
    pub fn acquire(path: &Path) -> Result<Self> {
        if path.exists() {
            let holder = std::fs::read_to_string(path)
                .ok()
                .and_then(|json| serde_json::from_str::<ProcessLock>(&json).ok());
            return Err(match holder {
                Some(lock) => ClipcastError::LockHeld {
                    pid: lock.pid,
                    started_at: lock.start_time.to_rfc3339(),
                },
                // Unreadable lock file still blocks startup.
                None => ClipcastError::LockHeld { pid: 0, started_at: "unknown".into() },
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = ProcessLock { pid: std::process::id(), start_time: Utc::now() };
        let json = serde_json::to_string_pretty(&lock)
            .map_err(|e| ClipcastError::Config(format!("lock serialize: {e}")))?;
        std::fs::write(path, json)?;
        tracing::info!("Acquired process lock at {} (pid {})", path.display(), lock.pid);
        Ok(Self { path: path.to_path_buf() })
    }

    /// Remove the lock file. Graceful shutdown path.
    pub fn release(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        tracing::info!("Released process lock at {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approver.lock");

        let lock = LockFile::acquire(&path).unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pid"], std::process::id());
        assert!(value["startTime"].is_string());

        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails_with_holder_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approver.lock");

        let _held = LockFile::acquire(&path).unwrap();
        let err = LockFile::acquire(&path).unwrap_err();
        match err {
            ClipcastError::LockHeld { pid, started_at } => {
                assert_eq!(pid, std::process::id());
                assert_ne!(started_at, "unknown");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_lock_file_still_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approver.lock");
        std::fs::write(&path, "not json").unwrap();

        let err = LockFile::acquire(&path).unwrap_err();
        assert!(matches!(err, ClipcastError::LockHeld { pid: 0, .. }));
    }

    #[test]
    fn test_acquire_after_manual_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approver.lock");
        let _held = LockFile::acquire(&path).unwrap();
        // Operator cleans up after a crash.
        std::fs::remove_file(&path).unwrap();
        assert!(LockFile::acquire(&path).is_ok());
    }
}

//! Per-model advisory lock around check-then-spawn

use crate::error::{GgufError, GgufResult};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive `flock` on `<lock_dir>/<key>.lock`, released on drop
#[derive(Debug)]
pub struct StartLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl StartLock {
    /// Block until the lock for `key` is held
    pub async fn acquire(lock_dir: &Path, key: &str) -> GgufResult<Self> {
        std::fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{}.lock", key));

        let lock_path = path.clone();
        let lock = tokio::task::spawn_blocking(move || -> GgufResult<Flock<File>> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
                GgufError::Process(format!("locking {:?}: {}", lock_path, errno))
            })
        })
        .await
        .map_err(|e| GgufError::Process(format!("lock task failed: {}", e)))??;

        tracing::debug!(path = ?path, "Start lock acquired");
        Ok(Self { _lock: lock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

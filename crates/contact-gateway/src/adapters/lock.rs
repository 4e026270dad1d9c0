//! # Sidecar File Locking
//!
//! Serializes read-modify-write cycles on the shared data files across
//! threads and processes that point at the same data directory.
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on
//! Windows). The lock lives on a `<file>.lock` sidecar so the guarded file
//! itself may be replaced while the lock is held.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::domain::error::StoreError;

/// First retry delay while waiting for a contended lock.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Retry delays are capped here.
const MAX_RETRY_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors from file locking
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock file could not be created
    #[error("failed to create lock file {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another holder kept the lock past the bounded wait
    #[error("lock {0} still held after wait")]
    TimedOut(PathBuf),
}

impl From<LockError> for StoreError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::CreateFailed { path, source } => StoreError::io(path, source),
            LockError::TimedOut(path) => StoreError::LockTimeout(path),
        }
    }
}

// =============================================================================
// FILE LOCK
// =============================================================================

/// Exclusive lock guarding one data file.
///
/// Released on drop (RAII). The sidecar file is left in place: removing it
/// while another waiter holds an open handle would split the lock in two.
#[derive(Debug)]
pub struct FileLock {
    /// The lock file handle (kept open to maintain lock)
    file: File,
    /// Path to the sidecar
    path: PathBuf,
}

impl FileLock {
    /// Sidecar path for `target`.
    pub fn sidecar_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the exclusive lock for `target`, waiting at most `timeout`.
    ///
    /// Retries with exponential backoff. The parent directory is created if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns `LockError::TimedOut` if another holder keeps the lock until
    /// the deadline passes.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = Self::sidecar_for(target);
        let deadline = Instant::now() + timeout;
        let mut retry_delay = INITIAL_RETRY_DELAY;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LockError::CreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::TimedOut(path));
                    }

                    // Never sleep past the deadline
                    std::thread::sleep(retry_delay.min(deadline - now));
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    /// Get the path to the sidecar
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock the file (release flock) - fs2::FileExt::unlock is stable
        #[allow(clippy::incompatible_msrv)]
        let _ = self.file.unlock();
    }
}

// =============================================================================
// TESTS
// =============================================================================

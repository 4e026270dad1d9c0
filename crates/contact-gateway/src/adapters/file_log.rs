//! Flat-file backends for the durable logs.
//!
//! - `FileRateLimitLog`: `timestamp|client` per line, rewritten whole under
//!   an exclusive lock on every admitted check.
//! - `FileAppendLog`: one record per line, opened in append mode.
//!
//! Files are created on first write and never truncated except by the
//! rate-limit rewrite, which only drops entries outside the window.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{trace, warn};

use crate::adapters::lock::FileLock;
use crate::domain::error::StoreError;
use crate::domain::types::RateLimitEntry;
use crate::ports::{AppendLog, RateLimitLog};

/// Rate-limit log stored as a flat file.
#[derive(Debug, Clone)]
pub struct FileRateLimitLog {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileRateLimitLog {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Vec<RateLimitEntry>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut skipped = 0usize;
        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = RateLimitEntry::parse_line(line);
                if entry.is_none() {
                    skipped += 1;
                }
                entry
            })
            .collect();

        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "Ignoring malformed rate limit lines");
        }
        Ok(entries)
    }

    /// Replace the file through a temp file and rename so readers never see
    /// a half-written log.
    fn write_entries(&self, entries: &[RateLimitEntry]) -> Result<(), StoreError> {
        let mut content = String::with_capacity(entries.len() * 32);
        for entry in entries {
            content.push_str(&entry.to_line());
            content.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

impl RateLimitLog for FileRateLimitLog {
    fn update(
        &self,
        apply: &mut dyn FnMut(Vec<RateLimitEntry>) -> Option<Vec<RateLimitEntry>>,
    ) -> Result<(), StoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        let entries = self.read_entries()?;
        if let Some(retained) = apply(entries) {
            self.write_entries(&retained)?;
            trace!(path = %self.path.display(), entries = retained.len(), "Rate limit log rewritten");
        }
        Ok(())
    }
}

/// Append-only line log stored as a flat file.
#[derive(Debug, Clone)]
pub struct FileAppendLog {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileAppendLog {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppendLog for FileAppendLog {
    fn append(&self, line: &str) -> Result<(), StoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;

        // One write per record keeps lines whole
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line.trim_end_matches('\n'));
        record.push('\n');

        file.write_all(record.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

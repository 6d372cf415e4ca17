//! Append-only JSONL audit log for session transitions.
//!
//! Every poison and unpoison writes one line. Rotation (by size) and
//! cleanup (by age) are logger policy, not part of the [`AuditSink`]
//! contract.

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Poison,
    Unpoison,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poison => f.write_str("Poison"),
            Self::Unpoison => f.write_str("Unpoison"),
        }
    }
}

/// How an unpoison token was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpoisonSource {
    EnvVar,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poison_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poison_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<UnpoisonSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Sink that drops everything; used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Aggregate numbers for `klack`'s diagnostics output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub entry_count: usize,
    pub size_bytes: u64,
}

/// JSONL audit logger with size-based rotation and age-based cleanup.
pub struct AuditLogger {
    path: PathBuf,
    enabled: bool,
    max_size_bytes: u64,
    max_age: Duration,
    max_backups: usize,
}

impl AuditLogger {
    pub fn new(
        path: impl Into<PathBuf>,
        enabled: bool,
        max_size_mb: u64,
        max_age_days: i64,
        max_backups: usize,
    ) -> Self {
        Self {
            path: path.into(),
            enabled,
            max_size_bytes: max_size_mb * 1024 * 1024,
            max_age: Duration::days(max_age_days),
            max_backups,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Entries currently on disk, oldest first. Malformed lines are
    /// skipped, not fatal.
    pub fn read(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Rename the current log aside and start fresh, pruning the oldest
    /// backups beyond the configured limit.
    pub fn rotate(&self) -> Result<(), AuditError> {
        if !self.path.exists() {
            return Ok(());
        }
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let backup = self.path.with_extension(format!("jsonl.{stamp}"));
        std::fs::rename(&self.path, &backup)?;
        self.prune_backups()?;
        Ok(())
    }

    /// Rewrite the log keeping only entries younger than the max age.
    pub fn cleanup(&self) -> Result<(), AuditError> {
        let entries = self.read()?;
        if entries.is_empty() {
            return Ok(());
        }
        let cutoff = Utc::now() - self.max_age;
        let kept: Vec<&AuditEntry> = entries.iter().filter(|e| e.timestamp > cutoff).collect();
        if kept.len() == entries.len() {
            return Ok(());
        }
        let mut buf = String::new();
        for entry in kept {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }
        std::fs::write(&self.path, buf)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<AuditStats, AuditError> {
        let size_bytes = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        Ok(AuditStats {
            entry_count: self.read()?.len(),
            size_bytes,
        })
    }

    fn rotate_if_needed(&self) -> Result<(), AuditError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.max_size_bytes => self.rotate(),
            _ => Ok(()),
        }
    }

    fn prune_backups(&self) -> Result<(), AuditError> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut backups: Vec<PathBuf> = std::fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path != &self.path
                    && path
                        .file_name()
                        .map(|n| n.to_string_lossy().starts_with(&stem))
                        .unwrap_or(false)
            })
            .collect();
        backups.sort();

        while backups.len() > self.max_backups {
            let oldest = backups.remove(0);
            debug!(path = %oldest.display(), "pruning audit backup");
            std::fs::remove_file(oldest)?;
        }
        Ok(())
    }
}

impl AuditSink for AuditLogger {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if !self.enabled {
            return Ok(());
        }
        self.rotate_if_needed()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(entry)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

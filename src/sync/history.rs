//! sync::history
//!
//! Append-only record of what each provider acknowledged.
//!
//! # Storage
//!
//! When a state directory is configured, records are appended to
//! `<state_dir>/sync-history.jsonl`, one JSON object per line, and the
//! file is fsynced after every append. A torn final line from a crash is
//! skipped on load.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::provider::CommitRef;

/// File name of the persisted history.
pub const HISTORY_FILE: &str = "sync-history.jsonl";

/// Errors from history persistence.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a provider's attempt at a flush ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The provider holds the flushed state
    Synced,
    /// Retries were exhausted or the error was permanent
    Failed { error: String },
    /// A newer flush reached the provider first
    Superseded,
}

/// One provider's result for one flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub seq: u64,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRef>,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    pub at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn synced(seq: u64, provider: &str, commit: Option<CommitRef>) -> Self {
        Self {
            seq,
            provider: provider.to_string(),
            commit,
            outcome: SyncOutcome::Synced,
            at: Utc::now(),
        }
    }

    pub fn failed(seq: u64, provider: &str, error: impl Into<String>) -> Self {
        Self {
            seq,
            provider: provider.to_string(),
            commit: None,
            outcome: SyncOutcome::Failed {
                error: error.into(),
            },
            at: Utc::now(),
        }
    }

    pub fn superseded(seq: u64, provider: &str) -> Self {
        Self {
            seq,
            provider: provider.to_string(),
            commit: None,
            outcome: SyncOutcome::Superseded,
            at: Utc::now(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.outcome == SyncOutcome::Synced
    }
}

/// The sync history.
#[derive(Debug, Default)]
pub struct SyncHistory {
    records: Vec<SyncRecord>,
    path: Option<PathBuf>,
}

impl SyncHistory {
    /// A history kept only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the history persisted under `state_dir`, creating it if needed.
    pub fn open(state_dir: &Path) -> Result<Self, HistoryError> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(HISTORY_FILE);
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), line = index + 1, error = %e, "skipping unreadable sync record")
                    }
                }
            }
        }
        Ok(Self {
            records,
            path: Some(path),
        })
    }

    /// Append a record, persisting it first when backed by a file.
    pub fn append(&mut self, record: SyncRecord) -> Result<(), HistoryError> {
        if let Some(path) = &self.path {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(line.as_bytes())?;
            file.sync_all()?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[SyncRecord] {
        &self.records
    }

    /// Records of one provider, oldest first.
    pub fn for_provider<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a SyncRecord> {
        self.records.iter().filter(move |r| r.provider == provider)
    }

    /// Highest sequence `provider` acknowledged.
    pub fn last_synced(&self, provider: &str) -> Option<u64> {
        self.for_provider(provider)
            .filter(|r| r.is_synced())
            .map(|r| r.seq)
            .max()
    }

    /// File backing this history, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

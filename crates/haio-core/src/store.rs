//! Durable status row and bounded activity log, backed by redb.
//!
//! # Table design
//!
//! `STATUS` holds one JSON-encoded [`OrchestratorStatus`] under the key
//! `"agent"`.
//!
//! `LOGS` uses a 16-byte composite key:
//! ```text
//! [ timestamp_ms: u64 big-endian (8 bytes) | sequence: u64 big-endian (8 bytes) ]
//! ```
//! Byte order equals time order, with the sequence breaking ties inside one
//! millisecond. Reverse iteration yields newest-first and `pop_first` evicts
//! the oldest entry.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::status::{LogEntry, OrchestratorStatus, Severity, StatusPatch};

/// Entries kept in the activity log before the oldest are evicted.
pub const MAX_LOG_ENTRIES: u64 = 1000;

const STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("status");
const LOGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("logs");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const STATUS_KEY: &str = "agent";
/// Last log sequence handed out. Never reused, whatever the wall clock does.
const LOG_SEQ_KEY: &str = "log_seq";

fn log_key(ts: DateTime<Utc>, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn key_seq(key: &[u8]) -> u64 {
    let mut seq = [0u8; 8];
    if key.len() == 16 {
        seq.copy_from_slice(&key[8..]);
    }
    u64::from_be_bytes(seq)
}

fn db_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::StatusDb(e.to_string())
}

// ---------------------------------------------------------------------------
// StatusDb
// ---------------------------------------------------------------------------

/// Persistent store for the orchestrator status row and its log.
pub struct StatusDb {
    db: Database,
    max_logs: u64,
}

impl StatusDb {
    /// Open or create the database at `path`, seeding a default IDLE status
    /// row if none exists.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_retention(path, MAX_LOG_ENTRIES)
    }

    pub fn open_with_retention(path: &Path, max_logs: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        {
            let mut status = wt.open_table(STATUS).map_err(db_err)?;
            wt.open_table(LOGS).map_err(db_err)?;
            wt.open_table(META).map_err(db_err)?;
            if status.get(STATUS_KEY).map_err(db_err)?.is_none() {
                let initial = serde_json::to_vec(&OrchestratorStatus::default())?;
                status
                    .insert(STATUS_KEY, initial.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        debug!(path = %path.display(), "status store opened");
        Ok(Self {
            db,
            max_logs: max_logs.max(1),
        })
    }

    pub fn get_status(&self) -> Result<OrchestratorStatus> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(STATUS).map_err(db_err)?;
        match table.get(STATUS_KEY).map_err(db_err)? {
            Some(v) => Ok(serde_json::from_slice(v.value())?),
            None => Ok(OrchestratorStatus::default()),
        }
    }

    /// Read-modify-write the status row inside one write transaction.
    pub fn upsert_status(&self, patch: StatusPatch) -> Result<OrchestratorStatus> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let updated = {
            let mut table = wt.open_table(STATUS).map_err(db_err)?;
            let mut current: OrchestratorStatus = match table.get(STATUS_KEY).map_err(db_err)? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => OrchestratorStatus::default(),
            };
            patch.apply(&mut current, Utc::now());
            let value = serde_json::to_vec(&current)?;
            table
                .insert(STATUS_KEY, value.as_slice())
                .map_err(db_err)?;
            current
        };
        wt.commit().map_err(db_err)?;
        Ok(updated)
    }

    /// Append a log entry and evict the oldest beyond the retention limit.
    pub fn append_log(
        &self,
        message: impl Into<String>,
        severity: Severity,
        reference: Option<String>,
    ) -> Result<LogEntry> {
        self.append_log_at(message.into(), severity, reference, Utc::now())
    }

    fn append_log_at(
        &self,
        message: String,
        severity: Severity,
        reference: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<LogEntry> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let entry = {
            let mut meta = wt.open_table(META).map_err(db_err)?;
            let mut table = wt.open_table(LOGS).map_err(db_err)?;
            let stored_seq = meta
                .get(LOG_SEQ_KEY)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            // Stores written before the counter existed only have their keys.
            let last_key_seq = match table.last().map_err(db_err)? {
                Some((k, _)) => key_seq(k.value()),
                None => 0,
            };
            let next_seq = stored_seq.max(last_key_seq) + 1;
            meta.insert(LOG_SEQ_KEY, next_seq).map_err(db_err)?;

            let entry = LogEntry {
                id: next_seq,
                timestamp,
                message,
                severity,
                reference,
            };
            let key = log_key(entry.timestamp, entry.id);
            let value = serde_json::to_vec(&entry)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;

            while table.len().map_err(db_err)? > self.max_logs {
                if table.pop_first().map_err(db_err)?.is_none() {
                    break;
                }
            }
            entry
        };
        wt.commit().map_err(db_err)?;
        Ok(entry)
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(LOGS).map_err(db_err)?;

        let mut result = Vec::with_capacity(limit.min(self.max_logs as usize));
        for entry in table.iter().map_err(db_err)?.rev().take(limit) {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn log_count(&self) -> Result<u64> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(LOGS).map_err(db_err)?;
        table.len().map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! TxLog: an append-only NDJSON transaction log, one run bracketed by a
//! `RUN_START`/`RUN_END` pair sharing a `run_id`, recording every path
//! written in between so [`crate::undo`] can reverse it.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AplError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TxRecord {
    #[serde(rename = "RUN_START")]
    RunStart { run_id: String, timestamp: String, goal: String },
    #[serde(rename = "PATH_WRITTEN")]
    PathWritten { run_id: String, path: String, sha256: String, created: bool },
    #[serde(rename = "RUN_END")]
    RunEnd { run_id: String, timestamp: String, status: String },
}

pub struct TxLog {
    path: PathBuf,
    run_id: String,
}

impl TxLog {
    pub fn new(sandbox_root: &Path, run_id: impl Into<String>) -> std::io::Result<Self> {
        let path = sandbox_root.join("logs").join("txlog.ndjson");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(TxLog { path, run_id: run_id.into() })
    }

    fn append(&self, record: &TxRecord) -> Result<(), AplError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut f = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn start(&self, timestamp: impl Into<String>, goal: impl Into<String>) -> Result<(), AplError> {
        self.append(&TxRecord::RunStart { run_id: self.run_id.clone(), timestamp: timestamp.into(), goal: goal.into() })
    }

    /// `created` records whether the write produced a new path (`true`) or
    /// overwrote one that already existed (`false`); [`crate::undo`] only
    /// reverses the former.
    pub fn record_write(&self, path: &Path, sha256: &str, created: bool) -> Result<(), AplError> {
        self.append(&TxRecord::PathWritten {
            run_id: self.run_id.clone(),
            path: path.to_string_lossy().into_owned(),
            sha256: sha256.to_string(),
            created,
        })
    }

    pub fn end(&self, timestamp: impl Into<String>, status: impl Into<String>) -> Result<(), AplError> {
        self.append(&TxRecord::RunEnd { run_id: self.run_id.clone(), timestamp: timestamp.into(), status: status.into() })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// Parse the log and return `(run_id, (path, created) pairs, status)` for
/// the most recent complete `RUN_START`..`RUN_END` span.
pub fn last_run_span(log_path: &Path) -> Result<Option<(String, Vec<(PathBuf, bool)>, String)>, AplError> {
    if !log_path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(log_path)?;
    let records: Vec<TxRecord> = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();

    let last_start = records.iter().rposition(|r| matches!(r, TxRecord::RunStart { .. }));
    let Some(start_idx) = last_start else { return Ok(None) };
    let TxRecord::RunStart { run_id, .. } = &records[start_idx] else { unreachable!() };

    let mut written = Vec::new();
    let mut status = "unknown".to_string();
    for record in &records[start_idx + 1..] {
        match record {
            TxRecord::PathWritten { run_id: r, path, created, .. } if r == run_id => {
                written.push((PathBuf::from(path), *created))
            }
            TxRecord::RunEnd { run_id: r, status: s, .. } if r == run_id => {
                status = s.clone();
                break;
            }
            _ => {}
        }
    }
    Ok(Some((run_id.clone(), written, status)))
}

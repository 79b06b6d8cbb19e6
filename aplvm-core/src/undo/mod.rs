//! Undo: best-effort reversal of the most recent run, by deleting every
//! path its `TxLog` span recorded as written.
//!
//! Deletion is best-effort: one path failing to delete does not stop the
//! rest from being attempted. There is no partial-rollback transaction —
//! every deletion is attempted independently.

use std::path::{Path, PathBuf};

use crate::errors::AplError;
use crate::vm::last_run_span;

#[derive(Debug, Clone)]
pub struct UndoReport {
    pub run_id: String,
    /// Paths that either were deleted, or would be deleted in a dry run.
    pub targets: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Undo the most recent complete run recorded in `sandbox_root`'s
/// transaction log. Only entries whose `created` flag is true are
/// reversed — a write that merely overwrote a pre-existing path is left in
/// place, since deleting it would destroy state the run didn't introduce.
/// With `dry_run` set, only populates `targets` — nothing is deleted.
pub fn undo_last_run(sandbox_root: &Path, dry_run: bool) -> Result<Option<UndoReport>, AplError> {
    let txlog_path = sandbox_root.join("logs").join("txlog.ndjson");
    let Some((run_id, written, _status)) = last_run_span(&txlog_path)? else {
        return Ok(None);
    };
    let paths: Vec<PathBuf> = written.into_iter().filter(|(_, created)| *created).map(|(p, _)| p).collect();

    if dry_run {
        return Ok(Some(UndoReport { run_id, targets: paths, deleted: vec![], failed: vec![] }));
    }

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for path in &paths {
        match std::fs::remove_file(path) {
            Ok(()) => deleted.push(path.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => deleted.push(path.clone()),
            Err(e) => failed.push((path.clone(), e.to_string())),
        }
    }

    Ok(Some(UndoReport { run_id, targets: paths, deleted, failed }))
}

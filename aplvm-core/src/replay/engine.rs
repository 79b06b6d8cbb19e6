//! ReplayEngine: re-execute a packaged run bit-for-bit and report any
//! output that diverged from the package's recorded checksum manifest.

use std::path::{Path, PathBuf};

use crate::errors::AplError;
use crate::model::{BytecodeEnvelope, Plan};
use crate::registry::ToolRegistry;
use crate::vm::{app_id_for, ChecksumManifest, PolicyStore, QuotaLimits, Vm};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayDiff {
    /// A path the original run produced is no longer produced on replay.
    MissingNow(PathBuf),
    /// A path both runs produced, but with a different content hash.
    HashMismatch { path: PathBuf, expected: String, actual: String },
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub run_id: String,
    pub diffs: Vec<ReplayDiff>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// Extract `plan.apl.json`, `bytecode.json`, and `checksums.json` from a
/// packaged archive into a fresh temp directory, returning the parsed plan,
/// bytecode, and the original run's checksum manifest.
pub fn extract_to_tmp(archive_path: &Path) -> Result<(tempfile::TempDir, Plan, BytecodeEnvelope, ChecksumManifest), AplError> {
    let file = std::fs::File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| AplError::lower_error(format!("not a valid archive: {e}")))?;
    let dir = tempfile::tempdir()?;

    let mut read_entry = |name: &str| -> Result<Vec<u8>, AplError> {
        let mut entry = zip.by_name(name).map_err(|_| AplError::lower_error(format!("archive missing {name}")))?;
        let mut buf = Vec::new();
        std::io::copy(&mut entry, &mut buf)?;
        Ok(buf)
    };

    let plan: Plan = serde_json::from_slice(&read_entry("plan.apl.json")?)?;
    let bytecode: BytecodeEnvelope = serde_json::from_slice(&read_entry("bytecode.json")?)?;
    let checksums: ChecksumManifest = serde_json::from_slice(&read_entry("checksums.json")?)?;

    Ok((dir, plan, bytecode, checksums))
}

/// Re-run a packaged program against `sandbox_root`, optionally purging
/// `sandbox/out` first, and diff the fresh run's output checksum manifest
/// against the one recorded in the package at pack time. Extra files the
/// fresh run produced that aren't in the original manifest are ignored.
pub fn replay(
    archive_path: &Path,
    sandbox_root: &Path,
    registry: &ToolRegistry,
    policy: &mut PolicyStore,
    purge_out: bool,
    run_id: impl Into<String>,
) -> Result<ReplayReport, AplError> {
    let (_tmp, _plan, bytecode, baseline) = extract_to_tmp(archive_path)?;

    if purge_out {
        let out_dir = sandbox_root.join("out");
        if out_dir.exists() {
            std::fs::remove_dir_all(&out_dir)?;
        }
        std::fs::create_dir_all(&out_dir)?;
    }

    let program_value = serde_json::to_value(&bytecode.program)?;
    let app_id = app_id_for(&program_value)?;
    let run_id = run_id.into();

    let mut vm = Vm::new(registry, sandbox_root.to_path_buf(), QuotaLimits::default());
    let outcome = vm.run(&bytecode, policy, &app_id, true, run_id.clone())?;

    let mut diffs = Vec::new();
    for (path, expected_hash) in &baseline.checksums {
        match outcome.checksums.get(path) {
            None => diffs.push(ReplayDiff::MissingNow(PathBuf::from(path))),
            Some(actual_hash) if actual_hash != expected_hash => diffs.push(ReplayDiff::HashMismatch {
                path: PathBuf::from(path),
                expected: expected_hash.clone(),
                actual: actual_hash.clone(),
            }),
            _ => {}
        }
    }

    Ok(ReplayReport { run_id, diffs })
}

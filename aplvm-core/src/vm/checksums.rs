//! Checksum manifest: a SHA-256 digest of every file under the sandbox
//! output directory, computed once a run completes successfully. This is
//! the artifact Replay diffs a fresh run's outputs against.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use aplvm_common::sha256_hex;

use crate::errors::AplError;

pub const CHECKSUMS_FILE: &str = "checksums.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumManifest {
    pub run_id: String,
    pub checksums: BTreeMap<String, String>,
}

/// Hash every file under `out_dir`, keyed by its path relative to `out_dir`
/// with forward-slash separators, skipping the manifest file itself so it
/// never hashes its own prior contents.
pub fn hash_output_dir(out_dir: &Path) -> Result<BTreeMap<String, String>, AplError> {
    let mut checksums = BTreeMap::new();
    if !out_dir.exists() {
        return Ok(checksums);
    }
    let mut stack = vec![out_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.parent() == Some(out_dir) && path.file_name().and_then(|n| n.to_str()) == Some(CHECKSUMS_FILE) {
                continue;
            }
            let relative = path.strip_prefix(out_dir).expect("walked under out_dir").to_string_lossy().replace('\\', "/");
            let contents = std::fs::read(&path)?;
            checksums.insert(relative, sha256_hex(&contents));
        }
    }
    Ok(checksums)
}

/// Walk `sandbox_root/out`, hash every file, and write the result to
/// `out/checksums.json`. Called by the VM once dispatch completes
/// successfully.
pub fn write_output_checksums(sandbox_root: &Path, run_id: &str) -> Result<ChecksumManifest, AplError> {
    let out_dir = sandbox_root.join("out");
    std::fs::create_dir_all(&out_dir)?;
    let checksums = hash_output_dir(&out_dir)?;
    let manifest = ChecksumManifest { run_id: run_id.to_string(), checksums };
    std::fs::write(out_dir.join(CHECKSUMS_FILE), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(manifest)
}

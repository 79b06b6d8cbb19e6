//! Packager: bundles a compiled run into a single ZIP archive containing
//! exactly `manifest.json, plan.apl.json, bytecode.json, policy.json,
//! checksums.json`.
//!
//! Entry timestamps are pinned to 2023-01-01T00:00:00 and entries are
//! written in sorted relative-path order so the archive is byte-identical
//! across runs of the same inputs.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use aplvm_common::sha256_hex;

use crate::errors::AplError;
use crate::model::{BytecodeEnvelope, Plan};
use crate::vm::{CapPolicy, ChecksumManifest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackManifest {
    pub app_id: String,
    pub goal: String,
    pub created_at: String,
    pub entries: Vec<String>,
}

const FIXED_TIMESTAMP: (u16, u8, u8, u8, u8, u8) = (2023, 1, 1, 0, 0, 0);

/// Write `dest_zip` from the compiled artifacts of a single run, embedding
/// `checksums` — the run's post-run output checksum manifest, as written by
/// [`crate::vm::write_output_checksums`] — as `checksums.json`. Returns the
/// manifest that was embedded as `manifest.json`.
pub fn pack(
    plan: &Plan,
    bytecode: &BytecodeEnvelope,
    policy: &CapPolicy,
    app_id: &str,
    created_at: impl Into<String>,
    checksums: &ChecksumManifest,
    dest_zip: &Path,
) -> Result<PackManifest, AplError> {
    let plan_json = serde_json::to_vec_pretty(plan)?;
    let bytecode_json = serde_json::to_vec_pretty(bytecode)?;
    let policy_json = serde_json::to_vec_pretty(policy)?;
    let checksums_json = serde_json::to_vec_pretty(checksums)?;

    let manifest = PackManifest {
        app_id: app_id.to_string(),
        goal: plan.goal.clone(),
        created_at: created_at.into(),
        entries: vec![
            "manifest.json".to_string(),
            "plan.apl.json".to_string(),
            "bytecode.json".to_string(),
            "policy.json".to_string(),
            "checksums.json".to_string(),
        ],
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest)?;

    if let Some(parent) = dest_zip.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let timestamp = zip::DateTime::from_date_and_time(
        FIXED_TIMESTAMP.0,
        FIXED_TIMESTAMP.1,
        FIXED_TIMESTAMP.2,
        FIXED_TIMESTAMP.3,
        FIXED_TIMESTAMP.4,
        FIXED_TIMESTAMP.5,
    )
    .map_err(|e| AplError::lower_error(format!("invalid fixed zip timestamp: {e}")))?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated).last_modified_time(timestamp);

    let mut sorted_entries: Vec<(&str, &[u8])> = vec![
        ("bytecode.json", &bytecode_json),
        ("checksums.json", &checksums_json),
        ("manifest.json", &manifest_json),
        ("plan.apl.json", &plan_json),
        ("policy.json", &policy_json),
    ];
    sorted_entries.sort_by_key(|(name, _)| *name);

    for (name, contents) in sorted_entries {
        zip.start_file(name, options).map_err(|e| AplError::lower_error(format!("zip write failed for {name}: {e}")))?;
        zip.write_all(contents)?;
    }
    zip.finish().map_err(|e| AplError::lower_error(format!("zip finalize failed: {e}")))?;

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompilationMode, Metadata};
    use std::io::Read as _;

    fn sample_plan() -> Plan {
        Plan {
            goal: "demo".to_string(),
            capabilities: vec!["fs.read".to_string()],
            inputs: Default::default(),
            steps: vec![],
            verify: vec![],
            rollback: vec![],
            generated_at: None,
        }
    }

    fn sample_bytecode() -> BytecodeEnvelope {
        BytecodeEnvelope {
            program: vec![],
            capabilities: vec!["fs.read".to_string()],
            slots: Default::default(),
            metadata: Metadata { goal: "demo".to_string(), inputs: Default::default(), compilation_mode: CompilationMode::Legacy },
        }
    }

    fn sample_checksums() -> ChecksumManifest {
        ChecksumManifest {
            run_id: "run-1".to_string(),
            checksums: BTreeMap::from([("model.json".to_string(), sha256_hex(b"model"))]),
        }
    }

    #[test]
    fn packs_and_embeds_the_output_checksum_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.aplz");
        let policy = CapPolicy { granted: ["fs.read".to_string()].into() };
        let checksums = sample_checksums();
        let manifest =
            pack(&sample_plan(), &sample_bytecode(), &policy, "abc123456789", "2023-01-01T00:00:00Z", &checksums, &dest)
                .unwrap();
        assert_eq!(manifest.entries.len(), 5);

        let file = std::fs::File::open(&dest).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("checksums.json").unwrap();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).unwrap();
        let roundtripped: ChecksumManifest = serde_json::from_slice(&buf).unwrap();
        assert_eq!(roundtripped.checksums, checksums.checksums);
    }
}

//! CapPolicy & PolicyStore: persistent, per-app capability grants keyed by a
//! stable `app_id` derived from the compiled program.
//!
//! A plan may declare a superset of the capabilities its tools actually
//! require; `PolicyStore` enforces the symmetric rule at run time — a run
//! may only use capabilities previously granted to its `app_id`,
//! auto-granting on first run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aplvm_common::{sha256_prefix, to_canonical_string};

use crate::errors::AplError;

const APP_ID_LEN: usize = 12;

/// Stable identifier for a compiled program: the first 12 hex characters of
/// `sha256(canonical_json(program))`.
pub fn app_id_for(program_json: &Value) -> Result<String, AplError> {
    let canonical = to_canonical_string(program_json).map_err(|e| AplError::lower_error(e.to_string()))?;
    Ok(sha256_prefix(canonical, APP_ID_LEN))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapPolicy {
    pub granted: BTreeSet<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    apps: BTreeMap<String, CapPolicy>,
}

pub struct PolicyStore {
    path: PathBuf,
    file: PolicyFile,
}

impl PolicyStore {
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self, AplError> {
        let path = path.into();
        let file = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            PolicyFile::default()
        };
        Ok(PolicyStore { path, file })
    }

    fn save(&self) -> Result<(), AplError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.file)?)?;
        Ok(())
    }

    pub fn grant(&self, app_id: &str) -> Option<&CapPolicy> {
        self.file.apps.get(app_id)
    }

    /// Verify `declared` capabilities are covered by the grant on record for
    /// `app_id`. With no existing grant: auto-grant `declared` when
    /// `auto_grant` is set, otherwise fail closed.
    pub fn check_or_grant(&mut self, app_id: &str, declared: &[String], auto_grant: bool) -> Result<(), AplError> {
        if let Some(existing) = self.file.apps.get(app_id) {
            for cap in declared {
                if !existing.granted.contains(cap) {
                    return Err(AplError::permission_denied(PathBuf::from(app_id)).with_capability(cap.clone()));
                }
            }
            return Ok(());
        }

        if !auto_grant {
            return Err(AplError::permission_denied(PathBuf::from(app_id))
                .with_capability(declared.first().cloned().unwrap_or_default()));
        }

        self.file.apps.insert(app_id.to_string(), CapPolicy { granted: declared.iter().cloned().collect() });
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_is_deterministic_and_twelve_chars() {
        let a = app_id_for(&serde_json::json!({"b": 1, "a": 2})).unwrap();
        let b = app_id_for(&serde_json::json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), APP_ID_LEN);
    }

    #[test]
    fn first_run_auto_grants_then_enforces() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PolicyStore::load_or_create(dir.path().join("policy.json")).unwrap();
        let caps = vec!["fs.read".to_string(), "fs.write".to_string()];
        store.check_or_grant("app1", &caps, true).unwrap();

        store.check_or_grant("app1", &caps, false).unwrap();

        let escalated = vec!["fs.read".to_string(), "proc.spawn".to_string()];
        assert!(store.check_or_grant("app1", &escalated, false).is_err());
    }

    #[test]
    fn unknown_app_without_auto_grant_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PolicyStore::load_or_create(dir.path().join("policy.json")).unwrap();
        assert!(store.check_or_grant("new-app", &["fs.read".to_string()], false).is_err());
    }
}

//! ReplayGate: gates non-deterministic tool calls through the
//! [`ModelCache`], making cache misses fatal while in Replay mode, after the
//! fatal-miss-in-strict-mode shape of a VCR cassette in record/replay mode.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::cache::model_cache::ModelCache;
use crate::errors::AplError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Cache misses call through and populate the cache.
    Normal,
    /// Cache misses are fatal: `ReplayMiss`.
    Replay,
}

pub struct ReplayGate {
    cache: ModelCache,
    mode: GateMode,
    last_run_log: std::path::PathBuf,
    calls_this_run: Vec<Value>,
}

impl ReplayGate {
    pub fn new(sandbox_root: &Path, mode: GateMode) -> std::io::Result<Self> {
        let cache = ModelCache::new(sandbox_root)?;
        let last_run_log = sandbox_root.join("logs").join("last_run_model_calls.json");
        Ok(ReplayGate { cache, mode, last_run_log, calls_this_run: Vec::new() })
    }

    /// Call `model` with `inputs`, consulting the cache first. `on_miss` is
    /// invoked only in [`GateMode::Normal`]; in [`GateMode::Replay`] a miss
    /// is always fatal, regardless of whether `on_miss` could have produced
    /// an answer.
    pub fn call<F>(&mut self, model: &str, inputs: &Value, on_miss: F) -> Result<Value, AplError>
    where
        F: FnOnce() -> Result<Value, AplError>,
    {
        if let Some(hit) = self.cache.get(model, inputs)? {
            self.record(model, inputs, &hit, true);
            return Ok(hit);
        }

        match self.mode {
            GateMode::Replay => {
                let key = self.cache.cache_key(model, inputs)?;
                Err(AplError::replay_miss(format!("no cached call for model {model:?} (key {key})")))
            }
            GateMode::Normal => {
                let outputs = on_miss()?;
                self.cache.put(model, inputs, &outputs)?;
                self.record(model, inputs, &outputs, false);
                Ok(outputs)
            }
        }
    }

    fn record(&mut self, model: &str, inputs: &Value, outputs: &Value, cache_hit: bool) {
        self.calls_this_run.push(serde_json::json!({
            "model": model,
            "inputs": inputs,
            "outputs": outputs,
            "cache_hit": cache_hit,
        }));
    }

    /// Persist this run's calls to `sandbox/logs/last_run_model_calls.json`
    /// so a later replay can reload the exact call sequence.
    pub fn finish(&self) -> std::io::Result<()> {
        if let Some(parent) = self.last_run_log.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.last_run_log, serde_json::to_string_pretty(&self.calls_this_run)?)?;
        Ok(())
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub fn cache_mut(&mut self) -> &mut ModelCache {
        &mut self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_mode_populates_cache_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = ReplayGate::new(dir.path(), GateMode::Normal).unwrap();
        let inputs = serde_json::json!({"q": "2+2"});
        let out = gate.call("calc", &inputs, || Ok(serde_json::json!({"a": 4}))).unwrap();
        assert_eq!(out, serde_json::json!({"a": 4}));

        let mut replay = ReplayGate::new(dir.path(), GateMode::Replay).unwrap();
        let out2 = replay.call("calc", &inputs, || panic!("should not miss")).unwrap();
        assert_eq!(out2, serde_json::json!({"a": 4}));
    }

    #[test]
    fn replay_mode_miss_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = ReplayGate::new(dir.path(), GateMode::Replay).unwrap();
        let err = gate.call("calc", &serde_json::json!({"q": "never cached"}), || Ok(serde_json::json!({}))).unwrap_err();
        assert_eq!(err.kind.as_str(), "ReplayMiss");
    }
}

//! ModelCache: a content-addressed cache of non-deterministic tool outputs,
//! sharded on disk by the first two hex characters of the cache key. No
//! cost/CO2 estimation fields are tracked here — this cache only concerns
//! itself with content addressing and hit-rate bookkeeping.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aplvm_common::{sha256_hex, to_canonical_string};

use crate::errors::AplError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub timestamp: String,
    pub model: String,
    pub inputs: Value,
    pub outputs: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CallLogRecord {
    timestamp: String,
    model: String,
    inputs: Value,
    outputs: Value,
    cache_hit: bool,
}

pub struct ModelCache {
    cache_root: PathBuf,
    call_log: PathBuf,
}

impl ModelCache {
    pub fn new(sandbox_root: &Path) -> std::io::Result<Self> {
        let cache_root = sandbox_root.join("cache").join("model");
        fs::create_dir_all(&cache_root)?;
        let call_log = sandbox_root.join("logs").join("model_calls.jsonl");
        if let Some(parent) = call_log.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(ModelCache { cache_root, call_log })
    }

    /// Cache key: `sha256(model_id || ':' || canonical_json(inputs))`.
    pub fn cache_key(&self, model: &str, inputs: &Value) -> Result<String, AplError> {
        let normalized = to_canonical_string(inputs).map_err(|e| AplError::lower_error(e.to_string()))?;
        Ok(sha256_hex(format!("{model}:{normalized}")))
    }

    fn shard_path(&self, cache_key: &str) -> PathBuf {
        let shard = &cache_key[..2.min(cache_key.len())];
        self.cache_root.join(shard).join(format!("{cache_key}.json"))
    }

    pub fn get(&mut self, model: &str, inputs: &Value) -> Result<Option<Value>, AplError> {
        let key = self.cache_key(model, inputs)?;
        let path = self.shard_path(&key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let entry: CacheEntry = serde_json::from_str(&raw)?;
        self.log_access(model, inputs, &entry.outputs, true)?;
        Ok(Some(entry.outputs))
    }

    pub fn put(&mut self, model: &str, inputs: &Value, outputs: &Value) -> Result<String, AplError> {
        let key = self.cache_key(model, inputs)?;
        let path = self.shard_path(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry {
            cache_key: key.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: model.to_string(),
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        };
        fs::write(&path, serde_json::to_string_pretty(&entry)?)?;
        self.log_access(model, inputs, outputs, false)?;
        Ok(key)
    }

    fn log_access(&self, model: &str, inputs: &Value, outputs: &Value, cache_hit: bool) -> Result<(), AplError> {
        let record = CallLogRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: model.to_string(),
            inputs: inputs.clone(),
            outputs: outputs.clone(),
            cache_hit,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        use std::io::Write;
        let mut f = fs::OpenOptions::new().create(true).append(true).open(&self.call_log)?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    /// `total_cached_calls`, `cache_size_bytes`, `cache_hit_rate` over the
    /// call log, backing `aplvm cache stats`.
    pub fn stats(&self) -> std::io::Result<CacheStats> {
        let mut total_cached = 0u64;
        let mut size_bytes = 0u64;
        if self.cache_root.exists() {
            for entry in walk(&self.cache_root)? {
                if entry.extension().and_then(|e| e.to_str()) == Some("json") {
                    total_cached += 1;
                    size_bytes += fs::metadata(&entry)?.len();
                }
            }
        }
        let mut hit_rate = 0.0;
        if self.call_log.exists() {
            let raw = fs::read_to_string(&self.call_log)?;
            let mut total = 0u64;
            let mut hits = 0u64;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                if let Ok(rec) = serde_json::from_str::<CallLogRecord>(line) {
                    total += 1;
                    if rec.cache_hit {
                        hits += 1;
                    }
                }
            }
            if total > 0 {
                hit_rate = hits as f64 / total as f64 * 100.0;
            }
        }
        Ok(CacheStats { total_cached_calls: total_cached, cache_size_bytes: size_bytes, cache_hit_rate: hit_rate })
    }

    pub fn clear(&self) -> std::io::Result<()> {
        if self.cache_root.exists() {
            fs::remove_dir_all(&self.cache_root)?;
        }
        fs::create_dir_all(&self.cache_root)?;
        if self.call_log.exists() {
            fs::remove_file(&self.call_log)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_cached_calls: u64,
    pub cache_size_bytes: u64,
    pub cache_hit_rate: f64,
}

fn walk(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ModelCache::new(dir.path()).unwrap();
        let inputs = serde_json::json!({"prompt": "hi", "seed": 1});
        cache.put("demo-model", &inputs, &serde_json::json!({"text": "hello"})).unwrap();
        let got = cache.get("demo-model", &inputs).unwrap();
        assert_eq!(got, Some(serde_json::json!({"text": "hello"})));
    }

    #[test]
    fn key_is_stable_under_key_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path()).unwrap();
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(cache.cache_key("m", &a).unwrap(), cache.cache_key("m", &b).unwrap());
    }

    #[test]
    fn miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ModelCache::new(dir.path()).unwrap();
        assert_eq!(cache.get("m", &serde_json::json!({})).unwrap(), None);
    }
}

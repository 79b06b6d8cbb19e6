//! `split`: deterministic train/validation split by row index and seed.
//!
//! Row `i` goes to train when the first byte of `md5("{i}:{seed}")` divided
//! by 255 is below `ratio`, otherwise to validation. If that leaves
//! validation empty and training has more than one row, the last training
//! row is moved over so evaluation always has something to work with.

use std::collections::BTreeMap;

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct Split;

impl Tool for Split {
    fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let table = inputs.get("table").ok_or_else(|| AplError::tool_failure("split", "missing required input 'table'"))?;
        let headers = table.get("headers").cloned().unwrap_or(Value::Array(vec![]));
        let rows = table.get("rows").and_then(Value::as_array).ok_or_else(|| AplError::tool_failure("split", "table is missing 'rows'"))?;
        let ratio = inputs.get("ratio").and_then(Value::as_f64).unwrap_or(0.8);
        let seed = inputs.get("seed").and_then(Value::as_i64).unwrap_or(1337);

        let mut train = Vec::new();
        let mut val = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let digest = md5::compute(format!("{i}:{seed}"));
            let byte = digest.0[0];
            if (byte as f64 / 255.0) < ratio {
                train.push(row.clone());
            } else {
                val.push(row.clone());
            }
        }
        if val.is_empty() && train.len() > 1 {
            val.push(train.pop().expect("train.len() > 1"));
        }

        let train_table = serde_json::json!({ "headers": headers, "rows": train });
        let val_table = serde_json::json!({ "headers": headers, "rows": val });
        Ok(BTreeMap::from([("train".to_string(), train_table), ("val".to_string(), val_table)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aplvm_core::registry::ToolContext;
    use std::path::{Path, PathBuf};

    struct NullCtx;
    impl ToolContext for NullCtx {
        fn sandbox_root(&self) -> &Path {
            Path::new(".")
        }
        fn resolve_path(&mut self, _: &str) -> Result<PathBuf, AplError> {
            unreachable!()
        }
        fn read_file(&mut self, _: &str) -> Result<Vec<u8>, AplError> {
            unreachable!()
        }
        fn write_file(&mut self, _: &str, _: &[u8]) -> Result<(), AplError> {
            unreachable!()
        }
        fn charge_cpu_ms(&mut self, _: u64) -> Result<(), AplError> {
            Ok(())
        }
    }

    #[test]
    fn same_seed_and_ratio_produce_the_same_split_every_time() {
        let rows: Vec<Value> = (0..20).map(|i| serde_json::json!({"x": i})).collect();
        let table = serde_json::json!({ "headers": ["x"], "rows": rows });
        let inputs = BTreeMap::from([
            ("table".to_string(), table),
            ("ratio".to_string(), serde_json::json!(0.8)),
            ("seed".to_string(), serde_json::json!(1337)),
        ]);
        let a = Split.call(&inputs, &mut NullCtx).unwrap();
        let b = Split.call(&inputs, &mut NullCtx).unwrap();
        assert_eq!(a["train"], b["train"]);
        assert_eq!(a["val"], b["val"]);
    }

    #[test]
    fn tiny_table_never_leaves_validation_empty() {
        let rows: Vec<Value> = (0..2).map(|i| serde_json::json!({"x": i})).collect();
        let table = serde_json::json!({ "headers": ["x"], "rows": rows });
        let inputs = BTreeMap::from([
            ("table".to_string(), table),
            ("ratio".to_string(), serde_json::json!(1.0)),
            ("seed".to_string(), serde_json::json!(1337)),
        ]);
        let out = Split.call(&inputs, &mut NullCtx).unwrap();
        assert!(!out["val"]["rows"].as_array().unwrap().is_empty());
    }
}

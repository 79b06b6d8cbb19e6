//! `profile`: per-column dtype and missing-ratio summary of a table.
//!
//! A column is `"number"` only if every non-null cell in it is numeric and
//! at least one cell is present, otherwise `"string"`.

use std::collections::BTreeMap;

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct Profile;

impl Tool for Profile {
    fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let table = inputs.get("table").ok_or_else(|| AplError::tool_failure("profile", "missing required input 'table'"))?;
        let headers = table
            .get("headers")
            .and_then(Value::as_array)
            .ok_or_else(|| AplError::tool_failure("profile", "table is missing 'headers'"))?;
        let rows = table.get("rows").and_then(Value::as_array).ok_or_else(|| AplError::tool_failure("profile", "table is missing 'rows'"))?;

        let n = rows.len();
        let mut cols = Vec::with_capacity(headers.len());
        for header in headers {
            let name = header.as_str().unwrap_or_default();
            let mut nonnull = 0usize;
            let mut any_number = false;
            let mut all_number_or_null = true;
            for row in rows {
                match row.get(name) {
                    Some(Value::Null) | None => {}
                    Some(Value::Number(_)) => {
                        nonnull += 1;
                        any_number = true;
                    }
                    Some(_) => {
                        nonnull += 1;
                        all_number_or_null = false;
                    }
                }
            }
            let dtype = if all_number_or_null && any_number { "number" } else { "string" };
            let missing = (n - nonnull) as f64 / (n.max(1) as f64);
            cols.push(serde_json::json!({ "name": name, "dtype": dtype, "missing": missing }));
        }

        let schema = serde_json::json!({ "rows": n, "cols": cols });
        Ok(BTreeMap::from([("schema".to_string(), schema)]))
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
    fn mixed_column_with_any_non_numeric_cell_is_string() {
        let table = serde_json::json!({
            "headers": ["a", "b"],
            "rows": [{"a": 1, "b": "x"}, {"a": 2, "b": null}],
        });
        let inputs = BTreeMap::from([("table".to_string(), table)]);
        let out = Profile.call(&inputs, &mut NullCtx).unwrap();
        let schema = &out["schema"];
        let cols = schema["cols"].as_array().unwrap();
        assert_eq!(cols[0]["dtype"], "number");
        assert_eq!(cols[1]["dtype"], "string");
        assert_eq!(cols[1]["missing"], 0.5);
    }
}

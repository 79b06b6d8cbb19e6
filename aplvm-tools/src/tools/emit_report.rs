//! `emit_report`: render a schema/metrics pair as a markdown report.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct EmitReport;

fn render(schema: &Value, metrics: &Value) -> String {
    let mut out = String::new();
    writeln!(out, "# FORGE Report").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "## Schema").unwrap();
    writeln!(out, "Rows: {}", schema.get("rows").and_then(Value::as_u64).unwrap_or(0)).unwrap();
    writeln!(out).unwrap();
    writeln!(out, "| column | dtype | missing |").unwrap();
    writeln!(out, "|---|---|---:|").unwrap();
    for col in schema.get("cols").and_then(Value::as_array).into_iter().flatten() {
        let name = col.get("name").and_then(Value::as_str).unwrap_or_default();
        let dtype = col.get("dtype").and_then(Value::as_str).unwrap_or_default();
        let missing = col.get("missing").and_then(Value::as_f64).unwrap_or(0.0);
        writeln!(out, "| {name} | {dtype} | {missing:.3} |").unwrap();
    }
    writeln!(out).unwrap();
    writeln!(out, "## Metrics").unwrap();
    if let Some(map) = metrics.as_object() {
        for (k, v) in map {
            if let Some(n) = v.as_f64() {
                writeln!(out, "- **{k}**: {n:.6}").unwrap();
            } else {
                writeln!(out, "- **{k}**: {v}").unwrap();
            }
        }
    }
    out
}

impl Tool for EmitReport {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let schema = inputs.get("schema").ok_or_else(|| AplError::tool_failure("emit_report", "missing required input 'schema'"))?;
        let metrics = inputs.get("metrics").ok_or_else(|| AplError::tool_failure("emit_report", "missing required input 'metrics'"))?;
        let out_path = inputs.get("out_path").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("emit_report", "missing required input 'out_path'"))?;

        let report = render(schema, metrics);
        ctx.write_file(out_path, report.as_bytes())?;
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_schema_table_and_metric_lines() {
        let schema = serde_json::json!({ "rows": 3, "cols": [{"name": "x", "dtype": "number", "missing": 0.0}] });
        let metrics = serde_json::json!({ "R2": 0.9 });
        let md = render(&schema, &metrics);
        assert!(md.contains("Rows: 3"));
        assert!(md.contains("| x | number | 0.000 |"));
        assert!(md.contains("**R2**: 0.900000"));
    }
}

//! `eval`: score a trained model against a validation table.
//!
//! Target and feature values that arrive as strings (common when a CSV cell
//! looks numeric but was coerced to text upstream) have `$` and `,`
//! stripped before parsing; a feature that still won't parse falls back to
//! its training-time imputed mean. When no row has a usable target value at
//! all, placeholder metrics are returned rather than dividing by zero.

use std::collections::BTreeMap;

use aplvm_common::round12;
use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct Eval;

fn numeric_value(v: &Value, impute: f64) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace('$', "").replace(',', "").trim().parse::<f64>().ok().or(Some(impute)),
        _ => None,
    }
}

fn target_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace('$', "").replace(',', "").trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl Tool for Eval {
    fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let model = inputs.get("model").ok_or_else(|| AplError::tool_failure("eval", "missing required input 'model'"))?;
        let val = inputs.get("val").ok_or_else(|| AplError::tool_failure("eval", "missing required input 'val'"))?;

        let feats: Vec<String> = model["features"].as_array().map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default();
        let impute: Vec<f64> = model["impute"].as_array().map(|a| a.iter().filter_map(Value::as_f64).collect()).unwrap_or_default();
        let coef: Vec<f64> = model["coef"].as_array().map(|a| a.iter().filter_map(Value::as_f64).collect()).unwrap_or_default();
        let intercept = model["intercept"].as_f64().unwrap_or(0.0);
        let target = model["target_column"].as_str().unwrap_or("price");

        let rows = val.get("rows").and_then(Value::as_array).ok_or_else(|| AplError::tool_failure("eval", "val table is missing 'rows'"))?;

        let mut y_true = Vec::new();
        let mut y_pred = Vec::new();
        for row in rows {
            let Some(yt) = row.get(target).and_then(target_value) else { continue };
            let mut pred = intercept;
            for (k, name) in feats.iter().enumerate() {
                let imp = impute.get(k).copied().unwrap_or(0.0);
                let x = row.get(name).and_then(|v| numeric_value(v, imp)).unwrap_or(imp);
                pred += coef.get(k).copied().unwrap_or(0.0) * x;
            }
            y_true.push(yt);
            y_pred.push(pred);
        }

        let metrics = if y_true.is_empty() {
            if rows.is_empty() {
                serde_json::json!({ "MSE": 0.0, "MAE": 0.0, "R2": 0.0, "validation_note": "no validation data" })
            } else {
                serde_json::json!({
                    "MSE": 999999.0,
                    "MAE": 999999.0,
                    "R2": -1.0,
                    "validation_note": format!("invalid validation data: target '{target}' contains no numeric values"),
                })
            }
        } else {
            let n = y_true.len() as f64;
            let mse = y_true.iter().zip(&y_pred).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n;
            let mae = y_true.iter().zip(&y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n;
            let mean = y_true.iter().sum::<f64>() / n;
            let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
            let ss_res: f64 = y_true.iter().zip(&y_pred).map(|(t, p)| (t - p).powi(2)).sum();
            let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
            serde_json::json!({ "MSE": round12(mse), "MAE": round12(mae), "R2": round12(r2) })
        };

        Ok(BTreeMap::from([("metrics".to_string(), metrics)]))
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
    fn perfect_model_scores_r2_of_one() {
        let model = serde_json::json!({ "features": ["x"], "coef": [2.0], "intercept": 1.0, "impute": [0.0], "target_column": "y" });
        let rows: Vec<Value> = (0..5).map(|i| serde_json::json!({"x": i as f64, "y": 2.0 * i as f64 + 1.0})).collect();
        let val = serde_json::json!({ "headers": ["x", "y"], "rows": rows });
        let inputs = BTreeMap::from([("model".to_string(), model), ("val".to_string(), val)]);
        let out = Eval.call(&inputs, &mut NullCtx).unwrap();
        assert_eq!(out["metrics"]["R2"], 1.0);
    }

    #[test]
    fn dollar_and_comma_formatted_target_is_parsed() {
        let model = serde_json::json!({ "features": [], "coef": [], "intercept": 5.0, "impute": [], "target_column": "price" });
        let val = serde_json::json!({ "headers": ["price"], "rows": [{"price": "$5,000.00"}] });
        let inputs = BTreeMap::from([("model".to_string(), model), ("val".to_string(), val)]);
        let out = Eval.call(&inputs, &mut NullCtx).unwrap();
        assert_eq!(out["metrics"]["MSE"], 24950025.0);
    }

    #[test]
    fn no_numeric_target_falls_back_to_placeholder_metrics() {
        let model = serde_json::json!({ "features": [], "coef": [], "intercept": 0.0, "impute": [], "target_column": "price" });
        let val = serde_json::json!({ "headers": ["price"], "rows": [{"price": "n/a"}] });
        let inputs = BTreeMap::from([("model".to_string(), model), ("val".to_string(), val)]);
        let out = Eval.call(&inputs, &mut NullCtx).unwrap();
        assert_eq!(out["metrics"]["R2"], -1.0);
    }
}

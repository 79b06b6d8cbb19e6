//! `train_lr`: ordinary least squares via the normal equations, solved by
//! Gaussian elimination with partial pivoting.
//!
//! Missing numeric features are mean-imputed, a bias column is prepended,
//! `X'X w = X'y` is regularized with `+= 1e-8` on the diagonal for
//! numerical stability, and every coefficient is rounded to 12 decimal
//! places before leaving the tool.

use std::collections::BTreeMap;

use aplvm_common::round12;
use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct TrainLr;

/// Solve `a x = b` in place via Gaussian elimination with partial pivoting.
/// `a` is square of size `n`; returns the solution vector.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for i in 0..n {
        let mut pivot = i;
        for k in (i + 1)..n {
            if a[k][i].abs() > a[pivot][i].abs() {
                pivot = k;
            }
        }
        a.swap(i, pivot);
        b.swap(i, pivot);

        for k in (i + 1)..n {
            if a[i][i] == 0.0 {
                continue;
            }
            let factor = a[k][i] / a[i][i];
            for j in i..n {
                a[k][j] -= factor * a[i][j];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut w = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * w[j];
        }
        w[i] = if a[i][i] != 0.0 { sum / a[i][i] } else { 0.0 };
    }
    w
}

impl Tool for TrainLr {
    fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let train = inputs.get("train").ok_or_else(|| AplError::tool_failure("train_lr", "missing required input 'train'"))?;
        let target = inputs.get("target").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("train_lr", "missing required input 'target'"))?;
        let headers: Vec<String> = train
            .get("headers")
            .and_then(Value::as_array)
            .ok_or_else(|| AplError::tool_failure("train_lr", "table is missing 'headers'"))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let rows = train.get("rows").and_then(Value::as_array).ok_or_else(|| AplError::tool_failure("train_lr", "table is missing 'rows'"))?;

        if !headers.iter().any(|h| h == target) {
            return Err(AplError::tool_failure("train_lr", format!("target column not found: {target}")));
        }
        let feat_names: Vec<String> = headers.iter().filter(|h| h.as_str() != target).cloned().collect();
        let p = feat_names.len();

        let mut feature_rows: Vec<Vec<Option<f64>>> = Vec::new();
        let mut ys: Vec<f64> = Vec::new();
        let mut sums = vec![0.0; p];
        let mut counts = vec![0usize; p];

        for row in rows {
            let Some(yv) = row.get(target).and_then(Value::as_f64) else { continue };
            let mut feat_row = Vec::with_capacity(p);
            for (k, name) in feat_names.iter().enumerate() {
                let v = row.get(name).and_then(Value::as_f64);
                if let Some(v) = v {
                    sums[k] += v;
                    counts[k] += 1;
                }
                feat_row.push(v);
            }
            feature_rows.push(feat_row);
            ys.push(yv);
        }

        if feature_rows.is_empty() {
            return Err(AplError::tool_failure("train_lr", "no valid rows to train on"));
        }

        let means: Vec<f64> = sums.iter().zip(&counts).map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 }).collect();

        let xb: Vec<Vec<f64>> = feature_rows
            .iter()
            .map(|row| {
                let mut r = vec![1.0];
                r.extend(row.iter().enumerate().map(|(k, v)| v.unwrap_or(means[k])));
                r
            })
            .collect();

        let dim = p + 1;
        let mut xtx = vec![vec![0.0; dim]; dim];
        for i in 0..dim {
            for j in 0..dim {
                xtx[i][j] = xb.iter().map(|row| row[i] * row[j]).sum();
            }
        }
        let mut xty = vec![0.0; dim];
        for i in 0..dim {
            xty[i] = xb.iter().zip(&ys).map(|(row, y)| row[i] * y).sum();
        }
        for i in 0..dim {
            xtx[i][i] += 1e-8;
        }

        let w = solve(xtx, xty);

        let model = serde_json::json!({
            "features": feat_names,
            "coef": w[1..].iter().map(|c| round12(*c)).collect::<Vec<_>>(),
            "intercept": round12(w[0]),
            "impute": means.iter().map(|m| round12(*m)).collect::<Vec<_>>(),
            "target_column": target,
        });
        Ok(BTreeMap::from([("model".to_string(), model)]))
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
    fn recovers_an_exact_linear_relationship() {
        let rows: Vec<Value> = (0..10).map(|i| serde_json::json!({"x": i as f64, "y": 2.0 * i as f64 + 1.0})).collect();
        let table = serde_json::json!({ "headers": ["x", "y"], "rows": rows });
        let inputs = BTreeMap::from([("train".to_string(), table), ("target".to_string(), serde_json::json!("y"))]);
        let out = TrainLr.call(&inputs, &mut NullCtx).unwrap();
        let model = &out["model"];
        let coef = model["coef"][0].as_f64().unwrap();
        let intercept = model["intercept"].as_f64().unwrap();
        assert!((coef - 2.0).abs() < 1e-6);
        assert!((intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_target_column_is_a_tool_failure() {
        let table = serde_json::json!({ "headers": ["x"], "rows": [{"x": 1.0}] });
        let inputs = BTreeMap::from([("train".to_string(), table), ("target".to_string(), serde_json::json!("missing"))]);
        assert!(TrainLr.call(&inputs, &mut NullCtx).is_err());
    }
}

//! `build_cli`: materialize a standalone prediction CLI for a trained model.
//!
//! Writes `model.npz` (a JSON payload despite the extension — kept for
//! compatibility with the predictor script), `schema.json`, and
//! `predict.py` into `out_dir`.

use std::collections::BTreeMap;

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct BuildCli;

const PREDICT_PY: &str = r#"import json, argparse
from pathlib import Path


def load_json(path):
    return json.loads(Path(path).read_text(encoding="utf-8"))


def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--input", required=True, help="path to a JSON record")
    args = parser.parse_args()

    model = load_json("model.npz")  # JSON payload despite the extension
    sample = load_json(args.input)

    features = model["features"]
    coef = model["coef"]
    intercept = float(model["intercept"])
    impute = model["impute"]

    xs = []
    for k, name in enumerate(features):
        v = sample.get(name)
        xs.append(float(v) if isinstance(v, (int, float)) else float(impute[k]))

    prediction = intercept + sum(c * x for c, x in zip(coef, xs))
    print(f"{prediction}")


if __name__ == "__main__":
    main()
"#;

impl Tool for BuildCli {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let model = inputs.get("model").ok_or_else(|| AplError::tool_failure("build_cli", "missing required input 'model'"))?;
        let schema = inputs.get("schema").ok_or_else(|| AplError::tool_failure("build_cli", "missing required input 'schema'"))?;
        let out_dir = inputs.get("out_dir").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("build_cli", "missing required input 'out_dir'"))?;

        let model_json = serde_json::to_string_pretty(model)?;
        let schema_json = serde_json::to_string_pretty(schema)?;

        ctx.write_file(&format!("{out_dir}/model.npz"), model_json.as_bytes())?;
        ctx.write_file(&format!("{out_dir}/schema.json"), schema_json.as_bytes())?;
        ctx.write_file(&format!("{out_dir}/predict.py"), PREDICT_PY.as_bytes())?;

        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aplvm_core::registry::ToolContext;
    use std::path::PathBuf;

    struct RecordingCtx {
        root: PathBuf,
        written: Vec<String>,
    }
    impl ToolContext for RecordingCtx {
        fn sandbox_root(&self) -> &std::path::Path {
            &self.root
        }
        fn resolve_path(&mut self, relative: &str) -> Result<PathBuf, AplError> {
            Ok(self.root.join(relative))
        }
        fn read_file(&mut self, _: &str) -> Result<Vec<u8>, AplError> {
            unreachable!()
        }
        fn write_file(&mut self, relative: &str, _contents: &[u8]) -> Result<(), AplError> {
            self.written.push(relative.to_string());
            Ok(())
        }
        fn charge_cpu_ms(&mut self, _: u64) -> Result<(), AplError> {
            Ok(())
        }
    }

    #[test]
    fn writes_model_schema_and_predictor() {
        let mut ctx = RecordingCtx { root: PathBuf::from("/sandbox"), written: vec![] };
        let inputs = BTreeMap::from([
            ("model".to_string(), serde_json::json!({"features": [], "coef": [], "intercept": 0.0, "impute": []})),
            ("schema".to_string(), serde_json::json!({"rows": 0, "cols": []})),
            ("out_dir".to_string(), serde_json::json!("sandbox/out/app")),
        ]);
        BuildCli.call(&inputs, &mut ctx).unwrap();
        assert_eq!(ctx.written, vec!["sandbox/out/app/model.npz", "sandbox/out/app/schema.json", "sandbox/out/app/predict.py"]);
    }
}

//! `verify_cli`: exercise a built prediction CLI against a sample record.
//!
//! Runs `predict.py --input <sample>` with the app directory as the
//! working directory, under a 10 second timeout, and requires stdout to
//! parse as a single finite float.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct VerifyCli;

const TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl Tool for VerifyCli {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let app_dir = inputs.get("app_dir").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("verify_cli", "missing required input 'app_dir'"))?;
        let sample = inputs.get("sample_json_path").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("verify_cli", "missing required input 'sample_json_path'"))?;

        let app_dir_abs = ctx.resolve_path(app_dir)?;
        let sample_abs = ctx.resolve_path(sample)?;

        let started = Instant::now();
        let mut child = Command::new("python3")
            .arg("predict.py")
            .arg("--input")
            .arg(&sample_abs)
            .current_dir(&app_dir_abs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AplError::tool_failure("verify_cli", format!("failed to spawn predict.py: {e}")))?;

        let output = loop {
            if let Some(status) = child.try_wait().map_err(|e| AplError::tool_failure("verify_cli", e.to_string()))? {
                let out = child.wait_with_output().map_err(|e| AplError::tool_failure("verify_cli", e.to_string()))?;
                break (status, out);
            }
            if started.elapsed() > TIMEOUT {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AplError::tool_failure("verify_cli", "predict.py timed out after 10s"));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let (status, out) = output;
        ctx.charge_cpu_ms(started.elapsed().as_millis() as u64)?;

        if !status.success() {
            return Err(AplError::tool_failure("verify_cli", format!("predict.py failed: {}", String::from_utf8_lossy(&out.stderr))));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        let trimmed = stdout.trim();
        let prediction: f64 = trimmed
            .parse()
            .map_err(|_| AplError::tool_failure("verify_cli", format!("predict.py did not print a float: {trimmed:?}")))?;
        if !prediction.is_finite() {
            return Err(AplError::tool_failure("verify_cli", "predict.py output is not finite"));
        }

        Ok(BTreeMap::from([("prediction".to_string(), serde_json::json!(prediction))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aplvm_core::registry::ToolContext;
    use std::path::PathBuf;

    struct FileCtx {
        root: PathBuf,
    }
    impl ToolContext for FileCtx {
        fn sandbox_root(&self) -> &std::path::Path {
            &self.root
        }
        fn resolve_path(&mut self, relative: &str) -> Result<PathBuf, AplError> {
            Ok(self.root.join(relative))
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
    fn missing_app_dir_is_a_tool_failure() {
        let mut ctx = FileCtx { root: PathBuf::from("/nonexistent-sandbox-root-for-test") };
        let inputs = BTreeMap::from([
            ("app_dir".to_string(), serde_json::json!("out/app")),
            ("sample_json_path".to_string(), serde_json::json!("out/sample.json")),
        ]);
        assert!(VerifyCli.call(&inputs, &mut ctx).is_err());
    }
}

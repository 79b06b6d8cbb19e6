//! `verify_zip`: confirm every entry in an archive is intact.
//!
//! Every entry is read fully so the `zip` crate's CRC-32 check runs against
//! each one.

use std::collections::BTreeMap;
use std::io::{Cursor, Read as _};

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct VerifyZip;

impl Tool for VerifyZip {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let zip_path = inputs.get("zip_path").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("verify_zip", "missing required input 'zip_path'"))?;

        let bytes = ctx.read_file(zip_path)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| AplError::tool_failure("verify_zip", format!("not a valid archive: {e}")))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| AplError::tool_failure("verify_zip", format!("corrupt entry: {e}")))?;
            let mut sink = Vec::new();
            entry.read_to_end(&mut sink).map_err(|e| AplError::tool_failure("verify_zip", format!("corrupt entry {}: {e}", entry.name())))?;
        }

        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aplvm_core::registry::ToolContext;
    use std::io::Write as _;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;

    struct FileCtx;
    impl ToolContext for FileCtx {
        fn sandbox_root(&self) -> &std::path::Path {
            std::path::Path::new(".")
        }
        fn resolve_path(&mut self, relative: &str) -> Result<PathBuf, AplError> {
            Ok(PathBuf::from(relative))
        }
        fn read_file(&mut self, relative: &str) -> Result<Vec<u8>, AplError> {
            Ok(std::fs::read(relative)?)
        }
        fn write_file(&mut self, _: &str, _: &[u8]) -> Result<(), AplError> {
            unreachable!()
        }
        fn charge_cpu_ms(&mut self, _: u64) -> Result<(), AplError> {
            Ok(())
        }
    }

    #[test]
    fn accepts_a_well_formed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bundle.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();

        let inputs = BTreeMap::from([("zip_path".to_string(), serde_json::json!(zip_path.to_str().unwrap()))]);
        assert!(VerifyZip.call(&inputs, &mut FileCtx).is_ok());
    }
}

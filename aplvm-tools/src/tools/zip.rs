//! `zip`: bundle a sandbox directory into a deterministic archive.
//!
//! Files are collected recursively, sorted by path relative to `src_dir`,
//! and written with a fixed `(2023, 1, 1, 0, 0, 0)` timestamp so the
//! archive's bytes are stable across runs.

use std::collections::BTreeMap;
use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct Zip;

fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort_by_key(|p| p.strip_prefix(root).unwrap_or(p).to_path_buf());
    Ok(found)
}

impl Tool for Zip {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let src_dir = inputs.get("src_dir").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("zip", "missing required input 'src_dir'"))?;
        let dest_zip = inputs.get("dest_zip").and_then(Value::as_str).ok_or_else(|| AplError::tool_failure("zip", "missing required input 'dest_zip'"))?;

        let src_abs = ctx.resolve_path(src_dir)?;
        let files = collect_files(&src_abs).map_err(AplError::from)?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::from_date_and_time(2023, 1, 1, 0, 0, 0).expect("fixed timestamp is valid"));

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buf);
            for file in &files {
                let arcname = file.strip_prefix(&src_abs).unwrap_or(file).to_string_lossy().replace('\\', "/");
                let contents = std::fs::read(file).map_err(AplError::from)?;
                writer.start_file(arcname, options).map_err(|e| AplError::tool_failure("zip", e.to_string()))?;
                writer.write_all(&contents).map_err(AplError::from)?;
            }
            writer.finish().map_err(|e| AplError::tool_failure("zip", e.to_string()))?;
        }

        ctx.write_file(dest_zip, buf.get_ref())?;
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_files_sorted_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/2.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b/1.txt"), b"1").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let rel: Vec<String> = files.iter().map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/")).collect();
        assert_eq!(rel, vec!["a.txt", "b/1.txt", "b/2.txt"]);
    }
}

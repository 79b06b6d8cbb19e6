//! ToolRegistry: discovery, validation, and dispatch of tool implementations.
//!
//! Tool implementations are registered as closures ahead of time rather than
//! loaded dynamically by name at call time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AplError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Where a tool's implementation lives: a locally-registered closure, or an
/// MCP endpoint. MCP dispatch is specified only at the interface level —
/// invoking one returns `ToolFailure`, it does not open a socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Implementation {
    Local { path: String },
    Mcp { server: String, remote_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub inputs: BTreeMap<String, PortSpec>,
    pub outputs: BTreeMap<String, PortSpec>,
    pub capabilities: Vec<String>,
    pub implementation: Implementation,
    #[serde(skip)]
    pub manifest_path: Option<PathBuf>,
}

const REQUIRED_MANIFEST_FIELDS: &[&str] =
    &["name", "version", "description", "category", "inputs", "outputs", "capabilities", "implementation"];

/// A context handle passed to every tool invocation: sandbox-confined
/// filesystem primitives plus the quota charger. Implemented by the VM
/// (`crate::vm::VmContext`).
pub trait ToolContext {
    fn sandbox_root(&self) -> &Path;
    fn resolve_path(&mut self, relative: &str) -> Result<PathBuf, AplError>;
    fn read_file(&mut self, relative: &str) -> Result<Vec<u8>, AplError>;
    fn write_file(&mut self, relative: &str, contents: &[u8]) -> Result<(), AplError>;
    fn charge_cpu_ms(&mut self, amount: u64) -> Result<(), AplError>;
}

pub trait Tool: Send + Sync {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError>;
}

/// The subset of registry behavior the Lowerer needs: whether a tool name
/// is known, and what capabilities it requires. Kept separate from
/// [`ToolRegistry`] so the Lowerer's unit tests don't need a populated
/// registry.
pub trait RegistryView {
    fn has_tool(&self, name: &str) -> bool;
    fn capabilities_for(&self, name: &str) -> Option<Vec<String>>;
}

/// A trivial [`RegistryView`] with no known tools, for compiler unit tests
/// that only exercise legacy-op lowering.
pub struct StaticRegistryView;

impl StaticRegistryView {
    pub fn empty() -> Self {
        StaticRegistryView
    }
}

impl RegistryView for StaticRegistryView {
    fn has_tool(&self, _name: &str) -> bool {
        false
    }
    fn capabilities_for(&self, _name: &str) -> Option<Vec<String>> {
        None
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
    implementations: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `tools_root` for `tool.json` manifests. Malformed manifests are
    /// logged and skipped, never fatal.
    pub fn discover_tools(&mut self, tools_root: &Path) -> std::io::Result<usize> {
        let mut discovered = 0;
        if !tools_root.exists() {
            return Ok(0);
        }
        for entry in walk_for_tool_json(tools_root)? {
            match std::fs::read_to_string(&entry) {
                Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(manifest) => {
                        if let Some(missing) = first_missing_field(&manifest) {
                            tracing::warn!(path = %entry.display(), field = missing, "invalid tool manifest: missing required field");
                            continue;
                        }
                        match serde_json::from_value::<ToolSpec>(manifest) {
                            Ok(mut spec) => {
                                spec.manifest_path = Some(entry.clone());
                                self.tools.insert(spec.name.clone(), spec);
                                discovered += 1;
                            }
                            Err(e) => tracing::warn!(path = %entry.display(), error = %e, "failed to parse tool manifest"),
                        }
                    }
                    Err(e) => tracing::warn!(path = %entry.display(), error = %e, "failed to parse tool manifest as JSON"),
                },
                Err(e) => tracing::warn!(path = %entry.display(), error = %e, "failed to read tool manifest"),
            }
        }
        tracing::info!(discovered, "tool discovery complete");
        Ok(discovered)
    }

    /// Register the closure that implements `name`. Called by the embedding
    /// binary to wire `aplvm-tools`'s built-ins into the registry.
    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.implementations.insert(name.into(), tool);
    }

    pub fn register_manifest(&mut self, spec: ToolSpec) {
        self.tools.insert(spec.name.clone(), spec);
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn list_tools(&self) -> Vec<&ToolSpec> {
        self.tools.values().collect()
    }

    pub fn tools_by_category(&self, category: &str) -> Vec<&ToolSpec> {
        self.tools.values().filter(|t| t.category == category).collect()
    }

    pub fn required_capabilities(&self, tool_names: &[String]) -> BTreeSet<String> {
        let mut caps = BTreeSet::new();
        for name in tool_names {
            if let Some(tool) = self.tools.get(name) {
                caps.extend(tool.capabilities.iter().cloned());
            }
        }
        caps
    }

    /// Required-input / unexpected-input diagnostics ahead of dispatch; does
    /// not replace the VM's capability/quota checks.
    pub fn validate_tool_inputs(&self, name: &str, inputs: &BTreeMap<String, Value>) -> Vec<String> {
        let Some(tool) = self.tools.get(name) else {
            return vec![format!("tool not found: {name}")];
        };
        let mut errors = Vec::new();
        for (port, spec) in &tool.inputs {
            if spec.required && !inputs.contains_key(port) {
                errors.push(format!("missing required input: {port}"));
            }
        }
        let expected: BTreeSet<&str> = tool.inputs.keys().map(String::as_str).collect();
        for actual in inputs.keys() {
            if !expected.contains(actual.as_str()) {
                errors.push(format!("unexpected input: {actual}"));
            }
        }
        errors
    }

    /// Dispatch a call to `name`'s registered implementation. The registry
    /// performs no capability check — that is the VM's responsibility.
    pub fn call(
        &self,
        name: &str,
        inputs: &BTreeMap<String, Value>,
        ctx: &mut dyn ToolContext,
    ) -> Result<BTreeMap<String, Value>, AplError> {
        let tool = self.implementations.get(name).ok_or_else(|| AplError::unknown_tool(name))?;
        tool.call(inputs, ctx)
    }
}

fn first_missing_field(manifest: &Value) -> Option<&'static str> {
    REQUIRED_MANIFEST_FIELDS.iter().find(|f| manifest.get(**f).is_none()).copied()
}

fn walk_for_tool_json(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some("tool.json") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

impl RegistryView for ToolRegistry {
    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name) || self.implementations.contains_key(name)
    }

    fn capabilities_for(&self, name: &str) -> Option<Vec<String>> {
        self.tools.get(name).map(|t| t.capabilities.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_tool_json_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data/read_csv");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(
            sub.join("tool.json"),
            serde_json::json!({
                "name": "read_csv",
                "version": "1.0.0",
                "description": "read a csv",
                "category": "data",
                "inputs": {"path": {"type": "string", "required": true}},
                "outputs": {"table": {"type": "table"}},
                "capabilities": ["fs.read"],
                "implementation": {"kind": "local", "path": "read_csv"}
            })
            .to_string(),
        )
        .unwrap();

        let mut registry = ToolRegistry::new();
        let n = registry.discover_tools(dir.path()).unwrap();
        assert_eq!(n, 1);
        assert!(registry.get_tool("read_csv").is_some());
    }

    #[test]
    fn skips_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bad")).unwrap();
        std::fs::write(dir.path().join("bad/tool.json"), "{\"name\": \"incomplete\"}").unwrap();

        let mut registry = ToolRegistry::new();
        let n = registry.discover_tools(dir.path()).unwrap();
        assert_eq!(n, 0);
    }
}

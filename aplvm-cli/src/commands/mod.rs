pub mod cache;
pub mod compile;
pub mod pack;
pub mod plan;
pub mod replay;
pub mod run;
pub mod undo;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use aplvm_core::model::Plan;
use aplvm_core::registry::ToolRegistry;

/// Build a registry with every built-in tool registered and its manifests
/// discovered from `tools_dir`. Shared by every subcommand that needs to
/// lower or dispatch through a [`ToolRegistry`].
pub fn load_registry(tools_dir: &Path) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    aplvm_tools::register_builtin_tools(&mut registry);
    registry.discover_tools(tools_dir).with_context(|| format!("discovering tool manifests under {}", tools_dir.display()))?;
    Ok(registry)
}

/// Read a plan document from disk as a raw JSON value, accepting either
/// JSON or YAML based on extension (`.yaml`/`.yml` vs. everything else).
/// Left undecoded so callers can run schema validation against it before
/// (and instead of, on failure) committing to the strict [`Plan`] shape.
pub fn load_plan_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading plan at {}", path.display()))?;
    if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")) {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {} as YAML", path.display()))
    } else {
        serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display()))
    }
}

/// Decode an already-validated plan document into the strict [`Plan`]
/// shape the lowerer and packager operate on.
pub fn decode_plan(plan_json: &serde_json::Value) -> anyhow::Result<Plan> {
    serde_json::from_value(plan_json.clone()).context("decoding plan structure")
}

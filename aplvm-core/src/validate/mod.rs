//! Validator: generates a draft-2020-12 JSON schema by reflecting on the
//! [`ToolRegistry`](crate::registry::ToolRegistry), then validates a plan
//! document against it.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::errors::AplError;
use crate::registry::ToolRegistry;

const BASE_CAPABILITIES: &[&str] = &["fs.read", "fs.write", "proc.spawn", "net.get", "model.call"];

/// Build the APL JSON schema from the currently discovered/registered
/// tools. Deterministic: the `op` enum and the capability enum are both
/// sorted.
pub fn generate_schema(registry: &ToolRegistry) -> Value {
    let mut tool_names: BTreeSet<String> = registry.list_tools().into_iter().map(|t| t.name.clone()).collect();
    tool_names.extend(
        ["load_csv", "profile_schema", "split_deterministic", "train_linear", "eval_metrics", "emit_report", "build_cli", "bundle_zip", "guard"]
            .iter()
            .map(|s| s.to_string()),
    );
    let op_enum: Vec<String> = tool_names.into_iter().collect();

    let mut capabilities: BTreeSet<String> = BASE_CAPABILITIES.iter().map(|s| s.to_string()).collect();
    for tool in registry.list_tools() {
        capabilities.extend(tool.capabilities.iter().cloned());
    }
    let capability_enum: Vec<String> = capabilities.into_iter().collect();

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://aplvm/schema/apl.json",
        "title": "Agent Plan Language (APL) - Dynamic",
        "type": "object",
        "required": ["goal", "capabilities", "steps"],
        "additionalProperties": false,
        "properties": {
            "goal": {"type": "string", "minLength": 1},
            "capabilities": {
                "type": "array",
                "minItems": 1,
                "items": {"type": "string", "enum": capability_enum},
                "uniqueItems": true
            },
            "inputs": {"type": "object", "additionalProperties": {"type": "string"}},
            "triggers": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["type"],
                    "properties": {"type": {"type": "string"}, "path": {"type": "string"}, "cron": {"type": "string"}},
                    "additionalProperties": true
                }
            },
            "steps": {"type": "array", "minItems": 1, "items": {"$ref": "#/$defs/step"}},
            "verify": {"type": "array", "items": {"$ref": "#/$defs/verifyStep"}},
            "rollback": {"type": "array", "items": {"$ref": "#/$defs/rollbackStep"}},
            "_generated_at": {"type": "string"}
        },
        "$defs": {
            "ioStringOrMap": {
                "oneOf": [
                    {"type": "string", "minLength": 1},
                    {"type": "object", "additionalProperties": true}
                ]
            },
            "step": {
                "type": "object",
                "required": ["id", "op"],
                "additionalProperties": false,
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "op": {"type": "string", "enum": op_enum},
                    "in": {"$ref": "#/$defs/ioStringOrMap"},
                    "out": {"$ref": "#/$defs/ioStringOrMap"},
                    "args": {"type": "object", "additionalProperties": true},
                    "cond": {"type": "string"},
                    "description": {"type": "string"}
                },
                "allOf": [
                    {"if": {"properties": {"op": {"const": "guard"}}}, "then": {"required": ["cond"]}}
                ]
            },
            "verifyStep": {
                "type": "object",
                "required": ["op"],
                "additionalProperties": false,
                "properties": {
                    "op": {"type": "string", "enum": ["verify_zip", "verify_cli_predicts", "verify_file_exists", "verify_nonempty"]},
                    "target": {"type": "string"},
                    "args": {"type": "object", "additionalProperties": true}
                }
            },
            "rollbackStep": {
                "type": "object",
                "required": ["op"],
                "additionalProperties": false,
                "properties": {
                    "op": {"type": "string", "enum": ["delete", "move_back"]},
                    "target": {"type": "string"},
                    "from": {"type": "string"},
                    "to": {"type": "string"}
                }
            }
        }
    })
}

/// Validate `plan_json` against `schema`, collecting every violation
/// instead of stopping at the first. Used by `aplvm plan lint`, which
/// reports the full set of problems at once rather than one at a time.
pub fn validate_all(schema: &Value, plan_json: &Value) -> Result<Vec<(String, String)>, AplError> {
    let compiled = jsonschema::validator_for(schema)
        .map_err(|e| AplError::lower_error(format!("invalid generated schema: {e}")))?;
    let mut violations: Vec<(String, String)> =
        compiled.iter_errors(plan_json).map(|e| (e.instance_path.to_string(), e.to_string())).collect();
    violations.sort();
    Ok(violations)
}

/// Validate `plan_json` against `schema`. On failure, returns the first
/// violation's JSON pointer and message.
pub fn validate(schema: &Value, plan_json: &Value) -> Result<(), AplError> {
    let compiled = jsonschema::validator_for(schema)
        .map_err(|e| AplError::lower_error(format!("invalid generated schema: {e}")))?;

    let mut errors = compiled.iter_errors(plan_json).peekable();
    if errors.peek().is_none() {
        return Ok(());
    }
    let mut sorted: Vec<_> = errors.collect();
    sorted.sort_by(|a, b| a.instance_path.to_string().cmp(&b.instance_path.to_string()));
    let first = &sorted[0];
    Err(AplError::schema_violation(first.instance_path.to_string(), first.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_top_level_key() {
        let registry = ToolRegistry::new();
        let schema = generate_schema(&registry);
        let plan = json!({
            "goal": "demo",
            "capabilities": ["fs.read"],
            "steps": [{"id": "s1", "op": "guard", "cond": "$x.y >= 1"}],
            "unexpected": true
        });
        assert!(validate(&schema, &plan).is_err());
    }

    #[test]
    fn accepts_minimal_valid_plan() {
        let registry = ToolRegistry::new();
        let schema = generate_schema(&registry);
        let plan = json!({
            "goal": "demo",
            "capabilities": ["fs.read"],
            "steps": [{"id": "s1", "op": "guard", "cond": "$x.y >= 1"}]
        });
        assert!(validate(&schema, &plan).is_ok());
    }
}

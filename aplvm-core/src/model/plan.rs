//! The Plan data model: the validated structure a plan document decodes
//! into once it has passed schema validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Either a bare `$name`/`$name.field` reference (or literal path string), or
/// a mapping from port name to a reference-or-literal. Mirrors the schema's
/// `ioStringOrMap` definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IoSpec {
    Single(String),
    Map(BTreeMap<String, Value>),
}

impl IoSpec {
    pub fn as_map(&self) -> BTreeMap<String, Value> {
        match self {
            IoSpec::Single(s) => {
                let mut m = BTreeMap::new();
                m.insert("value".to_string(), Value::String(s.clone()));
                m
            }
            IoSpec::Map(m) => m.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub op: String,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<IoSpec>,
    #[serde(rename = "out", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyStep {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStep {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<VerifyStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<RollbackStep>,
    #[serde(rename = "_generated_at", default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

/// Strips a leading `$` and any trailing `.field` path, returning the bare
/// variable root name. `$model.rmse` → `model`.
pub fn variable_root(reference: &str) -> Option<&str> {
    let rest = reference.strip_prefix('$')?;
    Some(rest.split('.').next().unwrap_or(rest))
}

/// Splits `$name.field.path` into (`name`, Some("field.path")).
pub fn variable_parts(reference: &str) -> Option<(&str, Option<&str>)> {
    let rest = reference.strip_prefix('$')?;
    match rest.split_once('.') {
        Some((root, field)) => Some((root, Some(field))),
        None => Some((rest, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_dollar_and_field() {
        assert_eq!(variable_root("$metrics.R2"), Some("metrics"));
        assert_eq!(variable_root("$model"), Some("model"));
        assert_eq!(variable_root("not_a_ref"), None);
    }

    #[test]
    fn splits_parts() {
        assert_eq!(variable_parts("$metrics.R2"), Some(("metrics", Some("R2"))));
        assert_eq!(variable_parts("$model"), Some(("model", None)));
    }
}

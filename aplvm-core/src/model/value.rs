//! The runtime value type slots hold during a single VM run: a tagged union
//! with fast downcasts for well-known shapes.
//!
//! Values never outlive the run they were produced in — slot contents exist
//! only for the duration of a single VM run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A single cell of a tabular value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Num(f64),
    Str(String),
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Num(n) => Some(*n),
            Cell::Str(s) => s.trim().parse::<f64>().ok(),
            Cell::Null => None,
        }
    }
}

/// A loaded CSV table: column order preserved via `headers`, rows keyed by
/// header name for resilience to column reordering downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<BTreeMap<String, Cell>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(name).and_then(Cell::as_f64)).collect()
    }
}

/// A trained linear model: coefficients in feature order plus the intercept,
/// rounded to 12 decimal places before being handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub features: Vec<String>,
    pub target: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// The tagged union every slot ultimately holds.
#[derive(Debug, Clone)]
pub enum RtValue {
    Table(Table),
    Schema(Json),
    Model(LinearModel),
    Metrics(Json),
    Path(String),
    Bool(bool),
    Json(Json),
}

impl RtValue {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            RtValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&LinearModel> {
        match self {
            RtValue::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            RtValue::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Look up `field_path` (a dotted path into a JSON-shaped value) as a
    /// number, for `ASSERT_GE` evaluation.
    pub fn field_as_f64(&self, field_path: &str) -> Option<f64> {
        let json = self.as_json_view();
        let mut cur = &json;
        for part in field_path.split('.').filter(|p| !p.is_empty()) {
            cur = cur.get(part)?;
        }
        cur.as_f64()
    }

    fn as_json_view(&self) -> Json {
        match self {
            RtValue::Schema(v) | RtValue::Metrics(v) | RtValue::Json(v) => v.clone(),
            RtValue::Model(m) => serde_json::to_value(m).unwrap_or(Json::Null),
            RtValue::Path(p) => Json::String(p.clone()),
            RtValue::Bool(b) => Json::Bool(*b),
            RtValue::Table(t) => serde_json::to_value(t).unwrap_or(Json::Null),
        }
    }

    /// Encode to the declared output port shape for a `CALL_TOOL` result map.
    pub fn to_json(&self) -> Json {
        self.as_json_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_as_f64_walks_dotted_path() {
        let metrics = RtValue::Metrics(serde_json::json!({"R2": 0.81, "nested": {"mae": 1.2}}));
        assert_eq!(metrics.field_as_f64("R2"), Some(0.81));
        assert_eq!(metrics.field_as_f64("nested.mae"), Some(1.2));
        assert_eq!(metrics.field_as_f64("missing"), None);
    }
}

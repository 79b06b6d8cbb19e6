//! `read_csv`: load a CSV file under the sandbox into a headered table.
//!
//! Each cell is coerced independently — blank becomes null, a value
//! containing `.`, `e` or `E` is tried as a float, otherwise as an int,
//! falling back to the raw string on parse failure.

use std::collections::BTreeMap;

use aplvm_core::errors::AplError;
use aplvm_core::registry::{Tool, ToolContext};
use serde_json::Value;

pub struct ReadCsv;

fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.contains('.') || trimmed.contains('e') || trimmed.contains('E') {
        if let Ok(f) = trimmed.parse::<f64>() {
            return serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
        }
    } else if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    Value::String(trimmed.to_string())
}

impl Tool for ReadCsv {
    fn call(&self, inputs: &BTreeMap<String, Value>, ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
        let path = inputs
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| AplError::tool_failure("read_csv", "missing required input 'path'"))?;

        let bytes = ctx.read_file(path)?;
        let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(bytes.as_slice());

        let mut records = reader.records();
        let header: Vec<String> = records
            .next()
            .ok_or_else(|| AplError::tool_failure("read_csv", format!("{path} has no header row")))?
            .map_err(|e| AplError::tool_failure("read_csv", format!("malformed CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in records {
            let record = record.map_err(|e| AplError::tool_failure("read_csv", format!("malformed CSV row: {e}")))?;
            let mut row = serde_json::Map::new();
            for (name, cell) in header.iter().zip(record.iter()) {
                row.insert(name.clone(), coerce_cell(cell));
            }
            rows.push(Value::Object(row));
        }

        let table = serde_json::json!({ "headers": header, "rows": rows });
        Ok(BTreeMap::from([("table".to_string(), table)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_numeric_and_blank_and_string_cells() {
        assert_eq!(coerce_cell("12"), Value::Number(12.into()));
        assert_eq!(coerce_cell("12.5"), serde_json::json!(12.5));
        assert_eq!(coerce_cell(""), Value::Null);
        assert_eq!(coerce_cell("downtown"), Value::String("downtown".to_string()));
    }
}

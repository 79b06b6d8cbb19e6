//! Canonical JSON encoding used for every content-addressed key: cache keys,
//! `app_id`, and checksum-manifest inputs.
//!
//! `serde_jcs` implements RFC 8785 (sorted object keys, no insignificant
//! whitespace, canonical number formatting) which is the same shape as the
//! source's `json.dumps(value, sort_keys=True, separators=(',', ':'))`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalizeError {
    #[error("failed to canonicalize JSON value: {0}")]
    Jcs(String),
}

/// Encode `value` into its canonical JSON byte representation.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalizeError> {
    serde_jcs::to_string(value).map_err(|e| CanonicalizeError::Jcs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(to_canonical_string(&v).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn is_stable_across_key_order() {
        let a = json!({"x": 1, "y": [1, 2, 3]});
        let b = json!({"y": [1, 2, 3], "x": 1});
        assert_eq!(to_canonical_string(&a).unwrap(), to_canonical_string(&b).unwrap());
    }
}

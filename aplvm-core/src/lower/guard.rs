//! Guard-expression grammar: `ident '.' path op number`, a tiny hand-written
//! grammar, not a general expression language.
//!
//! Only `>=` and `>` are accepted; `<`, `<=`, and `==` are rejected at
//! compile time rather than silently encoding them as an always-succeeding
//! `ASSERT_GE(slot, field, -inf)`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AplError;

static GUARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$(?P<root>[A-Za-z_][A-Za-z0-9_]*)\.(?P<field>[A-Za-z0-9_.]+)\s*(?P<op>>=|<=|==|>|<)\s*(?P<num>-?[0-9]+(?:\.[0-9]+)?)$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGuard {
    pub root: String,
    pub field_path: String,
    pub threshold: f64,
}

const GT_EPSILON: f64 = 1e-12;

/// Parse and lower a guard condition string into `(root, field_path,
/// threshold)` ready for `ASSERT_GE`. Only `>=` and `>` are accepted.
pub fn parse_guard(cond: &str) -> Result<ParsedGuard, AplError> {
    let caps = GUARD_RE
        .captures(cond.trim())
        .ok_or_else(|| AplError::lower_error(format!("malformed guard expression: {cond:?}")))?;

    let root = caps["root"].to_string();
    let field_path = caps["field"].to_string();
    let op = &caps["op"];
    let num: f64 = caps["num"]
        .parse()
        .map_err(|_| AplError::lower_error(format!("malformed guard threshold in: {cond:?}")))?;

    let threshold = match op {
        ">=" => num,
        ">" => num + GT_EPSILON,
        "<" | "<=" | "==" => {
            return Err(AplError::lower_error(format!(
                "guard operator '{op}' is not supported: rewrite the condition using '>=' or \
                 '>'. (in {cond:?})"
            )))
        }
        other => return Err(AplError::lower_error(format!("unsupported guard operator: {other}"))),
    };

    Ok(ParsedGuard { root, field_path, threshold })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ge() {
        let g = parse_guard("$metrics.R2 >= 0.6").unwrap();
        assert_eq!(g.root, "metrics");
        assert_eq!(g.field_path, "R2");
        assert_eq!(g.threshold, 0.6);
    }

    #[test]
    fn gt_gets_epsilon() {
        let g = parse_guard("$metrics.R2 > 0.6").unwrap();
        assert!((g.threshold - (0.6 + GT_EPSILON)).abs() < 1e-15);
    }

    #[test]
    fn rejects_lt_le_eq() {
        assert!(parse_guard("$metrics.R2 < 0.6").is_err());
        assert!(parse_guard("$metrics.R2 <= 0.6").is_err());
        assert!(parse_guard("$metrics.R2 == 0.6").is_err());
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_guard("metrics.R2 >= 0.6").is_err());
        assert!(parse_guard("$metrics >= 0.6").is_err());
    }
}

//! Document representation and SQL-safe naming helpers

use crate::{Error, Result};
use serde_json::{Map, Value};

/// A stored document: a JSON object with named fields
pub type Document = Map<String, Value>;

/// Canonical string form of a key value
///
/// Integral numbers render without a fractional part so `10` and `10.0`
/// address the same document. Null, arrays and objects are not keys.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some((f as i64).to_string())
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Validate a field or database name before it is spliced into SQL
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid identifier: '{}'", name)))
    }
}

/// Validate a collection name
///
/// Same alphabet as [`validate_identifier`] but must start with a letter;
/// leading underscores are reserved for internal tables.
pub fn validate_collection_name(name: &str) -> Result<()> {
    validate_identifier(name)?;
    if name.starts_with('_') {
        return Err(Error::InvalidInput(format!(
            "Collection names may not start with '_': '{}'",
            name
        )));
    }
    Ok(())
}

/// SQL expression extracting `field` from the `body` column of `alias`
///
/// `field` must already be validated.
pub fn json_path(alias: Option<&str>, field: &str) -> String {
    match alias {
        Some(a) => format!("json_extract({}.body, '$.{}')", a, field),
        None => format!("json_extract(body, '$.{}')", field),
    }
}

//! Numeric coercion of stored field values
//!
//! Documents written by other tools store the same logical number in
//! different shapes: integers, floats, and for identifiers sometimes text.
//! These helpers accept the known shapes and reject everything else with a
//! [`CoercionError`] naming the field.

use serde_json::Value;

use crate::error::CoercionError;
use crate::store::Document;

/// Integer from an integer, a finite float (truncated) or numeric text
pub fn coerce_integer(field: &str, value: &Value) -> Result<i64, CoercionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(CoercionError::new(field, format!("out of range number {}", n)))
                }
            } else {
                Err(CoercionError::new(field, format!("out of range number {}", n)))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CoercionError::new(field, format!("text {:?}", s))),
        other => Err(CoercionError::new(field, describe(other))),
    }
}

/// Float from any finite JSON number
pub fn coerce_float(field: &str, value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| CoercionError::new(field, format!("number {}", n))),
        other => Err(CoercionError::new(field, describe(other))),
    }
}

/// Look `field` up in `doc`, treating absence as a coercion failure
pub fn required<'a>(doc: &'a Document, field: &str) -> Result<&'a Value, CoercionError> {
    doc.get(field)
        .ok_or_else(|| CoercionError::new(field, "missing value"))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("text {:?}", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

//! Scalar coercions applied by `cast` fixes.
//!
//! Coercion is loose, the way request and storage data usually needs it:
//! numeric strings are read up to their first non-numeric character, empty
//! containers are falsy, and nothing ever fails once the kind is known.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Target kind of a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastKind {
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "double")]
    Float,
    String,
    #[serde(alias = "bool")]
    Boolean,
}

impl FromStr for CastKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(CastKind::Integer),
            "float" | "double" => Ok(CastKind::Float),
            "string" => Ok(CastKind::String),
            "boolean" | "bool" => Ok(CastKind::Boolean),
            _ => Err(Error::InvalidCastKind(s.to_string())),
        }
    }
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastKind::Integer => "integer",
            CastKind::Float => "float",
            CastKind::String => "string",
            CastKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Coerce `value` in place.
pub fn cast_value(value: &mut Value, kind: CastKind) {
    let cast = match kind {
        CastKind::Integer => Value::from(to_integer(value)),
        CastKind::Float => float_value(to_float(value)),
        CastKind::String => Value::String(to_string(value)),
        CastKind::Boolean => Value::Bool(to_boolean(value)),
    };
    *value = cast;
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Loose integer reading of any JSON value.
pub fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .unwrap_or_else(|| n.as_f64().map_or(0, truncate)),
        Value::String(s) => numeric_prefix(s).map_or(0, truncate),
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Object(map) => i64::from(!map.is_empty()),
    }
}

/// Loose float reading of any JSON value.
pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => numeric_prefix(s).unwrap_or(0.0),
        #[allow(clippy::cast_precision_loss)]
        other => to_integer(other) as f64,
    }
}

/// Loose string rendering of any JSON value.
pub fn to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", truncate(f))
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        container => container.to_string(),
    }
}

/// Truthiness: null, `false`, zero, `""`, `"0"` and empty containers are false.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(f: f64) -> i64 {
    f.trunc() as i64
}

/// Longest leading numeric part of `s`: optional sign, digits, fraction and
/// exponent, after leading whitespace.
fn numeric_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if bytes.get(end) == Some(&b'.') {
        let fraction_start = end + 1;
        let mut fraction_end = fraction_start;
        while bytes.get(fraction_end).is_some_and(u8::is_ascii_digit) {
            fraction_end += 1;
        }
        mantissa_digits += fraction_end - fraction_start;
        if mantissa_digits > 0 {
            end = fraction_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent_end = end + 1;
        if matches!(bytes.get(exponent_end), Some(b'+' | b'-')) {
            exponent_end += 1;
        }
        let exponent_digits_start = exponent_end;
        while bytes.get(exponent_end).is_some_and(u8::is_ascii_digit) {
            exponent_end += 1;
        }
        if exponent_end > exponent_digits_start {
            end = exponent_end;
        }
    }

    s[..end].parse().ok()
}

//! Named value filters.
//!
//! Fixes refer to value transforms by name (`filter`, `cFilter`, `mFilter`).
//! The registry resolves those names; the built-in filters are registered
//! under the names existing resource definitions already use.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::cast::to_integer;
use crate::error::{Error, Result};

/// A value transform, called with the value and the current user.
pub type ValueFilterFn = Arc<dyn Fn(Value, Option<Uuid>) -> Result<Value> + Send + Sync>;

pub const JSON: &str = "filterJsonAfterwards";
pub const JSON_OR_NULL: &str = "filterJsonOrNullAfterwards";
pub const JSON_IF_NULL_SET_EMPTY_OBJECT: &str = "filterJsonIfNullSetEmptyObjectAfterwards";
pub const NL2BR: &str = "filterNl2BrAfterwards";
pub const DATETIME: &str = "filterDatetimeAfterwards";
pub const DATETIME_OR_NULL: &str = "filterDatetimeOrNullAfterwards";
pub const INT_OR_NULL: &str = "filterIntOrNullAfterwards";

/// Name → value filter.
#[derive(Clone)]
pub struct ValueFilterRegistry {
    filters: HashMap<String, ValueFilterFn>,
}

impl Default for ValueFilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ValueFilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("ValueFilterRegistry")
            .field("filters", &names)
            .finish()
    }
}

impl ValueFilterRegistry {
    /// A registry without any filters.
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// A registry holding the built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(JSON, |value, _| Ok(decode_json(value)));
        registry.register(JSON_OR_NULL, |value, _| Ok(decode_json(value)));
        registry.register(JSON_IF_NULL_SET_EMPTY_OBJECT, |value, _| {
            Ok(match value {
                Value::Null => Value::Object(Map::new()),
                other => decode_json(other),
            })
        });
        registry.register(NL2BR, |value, _| Ok(Value::String(nl2br(&value))));
        registry.register(DATETIME, |value, _| datetime(DATETIME, &value));
        registry.register(DATETIME_OR_NULL, |value, _| match value {
            Value::Null => Ok(Value::Null),
            other => datetime(DATETIME_OR_NULL, &other),
        });
        registry.register(INT_OR_NULL, |value, _| {
            Ok(match value {
                Value::Null => Value::Null,
                other => Value::from(to_integer(&other)),
            })
        });
        registry
    }

    /// Register `filter` under `name`, replacing any filter of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(Value, Option<Uuid>) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Run the filter registered under `name`.
    pub fn apply(&self, name: &str, value: Value, current_user: Option<Uuid>) -> Result<Value> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| Error::UnresolvableHandler(name.to_string()))?;
        filter(value, current_user)
    }
}

/// Decode JSON text. Anything that is not valid JSON text becomes `null`;
/// values that are already structured pass through.
fn decode_json(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::Null),
        other => other,
    }
}

/// Insert `<br>` before every line break (`\r\n`, `\n\r`, `\n` or `\r`).
fn nl2br(value: &Value) -> String {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => super::cast::to_string(other),
    };
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                out.push_str("<br>");
                out.push(c);
                let pair = if c == '\r' { '\n' } else { '\r' };
                if let Some(next) = chars.next_if_eq(&pair) {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn datetime(name: &str, value: &Value) -> Result<Value> {
    let parsed = match value {
        Value::String(text) => parse_datetime(text),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    };
    parsed
        .map(|dt| Value::String(dt.to_rfc3339()))
        .ok_or_else(|| Error::ValueFilter {
            name: name.to_string(),
            reason: format!("`{value}` is not a date/time"),
        })
}

pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

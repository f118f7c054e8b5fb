//! Allow-listed field selection.
//!
//! Only headers whose name matches the configured pattern and only the configured top-level body
//! keys ever reach a log record. Selections are flattened into dotted keys (`headers.x-foo`,
//! `body.user.name`) so sinks see one key per scalar.

use axum::http::HeaderMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::types::LogRecord;

/// Flatten nested objects under `prefix` into dotted keys.
///
/// Non-empty objects are descended into; every other value (scalars, arrays, empty objects) is
/// copied as a leaf. A non-object `value` yields a single `prefix` entry.
///
/// ```rust
/// use logtap::select::flatten;
/// use serde_json::json;
///
/// let flat = flatten(&json!({"a": {"b": 1}, "c": [1, 2]}), "body");
/// assert_eq!(flat.get("body.a.b"), Some(&json!(1)));
/// assert_eq!(flat.get("body.c"), Some(&json!([1, 2])));
/// ```
pub fn flatten(value: &Value, prefix: &str) -> LogRecord {
    let mut out = LogRecord::new();
    flatten_into(&mut out, prefix, value);
    out
}

fn flatten_into(out: &mut LogRecord, key: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (name, child) in map {
                let child_key = if key.is_empty() {
                    name.clone()
                } else {
                    format!("{key}.{name}")
                };
                flatten_into(out, &child_key, child);
            }
        }
        _ => {
            out.insert(key.to_owned(), value.clone());
        }
    }
}

/// Select headers whose name matches `pattern`, flattened under `headers.`.
///
/// Names are matched in the lowercase form `HeaderMap` stores them in.
///
/// Returns an empty map when there are no headers, no pattern, or no match. Repeated headers are
/// joined with `", "`; non-UTF-8 values are decoded lossily.
pub fn select_headers(headers: Option<&HeaderMap>, pattern: Option<&Regex>) -> LogRecord {
    let (Some(headers), Some(pattern)) = (headers, pattern) else {
        return LogRecord::new();
    };

    let mut selected = Map::new();
    for name in headers.keys() {
        if !pattern.is_match(name.as_str()) {
            continue;
        }
        let value = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        selected.insert(name.as_str().to_owned(), Value::String(value));
    }

    if selected.is_empty() {
        return LogRecord::new();
    }
    flatten(&Value::Object(selected), "headers")
}

/// Select allow-listed top-level keys of a POST body, flattened under `body.`.
///
/// `None` unless the method is POST, an allow-list is configured, the body is an object and at
/// least one key was picked.
pub fn select_body(method: &str, body: Option<&Value>, keys: Option<&[String]>) -> Option<LogRecord> {
    if !method.eq_ignore_ascii_case("POST") {
        return None;
    }
    let keys = keys?;
    let Value::Object(body) = body? else {
        return None;
    };

    let picked: Map<String, Value> = keys
        .iter()
        .filter_map(|key| body.get(key).map(|value| (key.clone(), value.clone())))
        .collect();

    if picked.is_empty() {
        return None;
    }
    Some(flatten(&Value::Object(picked), "body"))
}

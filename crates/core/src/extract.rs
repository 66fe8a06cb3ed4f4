//! Lenient accessors over semi-structured payload documents.
//!
//! Every processor reads the raw payload through these helpers. A lookup
//! never fails: an absent key, a `null`, or a value of the wrong shape all
//! come back as `None`, and [`Fields`] turns `None` into a default while
//! remembering that it did so.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Numbers below this are read as epoch seconds rather than milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Walks `path` through nested objects. `null` counts as absent.
pub fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |value, key| value.as_object()?.get(*key))
        .filter(|value| !value.is_null())
}

/// Trimmed non-empty string. Numbers and booleans are rendered as text.
pub fn string_at(doc: &Value, path: &[&str]) -> Option<String> {
    match lookup(doc, path)? {
        Value::String(s) => non_blank(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer value. Floats are rounded, numeric strings are parsed.
pub fn i64_at(doc: &Value, path: &[&str]) -> Option<i64> {
    match lookup(doc, path)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_to_i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(round_to_i64))
        }
        _ => None,
    }
}

/// Floats outside the `i64` range are rejected instead of saturating.
fn round_to_i64(f: f64) -> Option<i64> {
    let rounded = f.round();
    (rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64)
        .then_some(rounded as i64)
}

/// Finite float value. Numeric strings are parsed.
pub fn f64_at(doc: &Value, path: &[&str]) -> Option<f64> {
    let value = match lookup(doc, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|f| f.is_finite())
}

pub fn timestamp_at(doc: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    parse_timestamp(lookup(doc, path)?)
}

pub fn array_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    lookup(doc, path)?.as_array()
}

pub fn object_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Map<String, Value>> {
    lookup(doc, path)?.as_object()
}

/// Returns the first alternative path that yields a value.
pub fn first<'a, T>(
    doc: &'a Value,
    paths: &[&[&str]],
    get: impl Fn(&'a Value, &[&str]) -> Option<T>,
) -> Option<T> {
    paths.iter().find_map(|path| get(doc, path))
}

/// Parses an absolute timestamp.
///
/// Accepts RFC 3339 strings, naive ISO date-times (taken as UTC), and epoch
/// numbers (milliseconds, or seconds when small enough to be seconds).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.and_utc());
                }
            }
            s.parse::<f64>().ok().and_then(epoch_to_datetime)
        }
        Value::Number(n) => n.as_f64().and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch < 0.0 {
        return None;
    }
    let millis = if epoch < EPOCH_MILLIS_THRESHOLD {
        epoch * 1000.0
    } else {
        epoch
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

/// Trimmed copy of `s`, or `None` when it is absent or blank.
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Typed reader over one payload document.
///
/// Optional fields (`opt_*`) simply return `None`. Fields a processor
/// depends on (`*_or`) substitute the given default and flag the reader, so
/// the caller can record that the row was processed with defaults.
#[derive(Debug)]
pub struct Fields<'a> {
    doc: &'a Value,
    defaulted: bool,
}

impl<'a> Fields<'a> {
    pub fn new(doc: &'a Value) -> Self {
        Self {
            doc,
            defaulted: false,
        }
    }

    pub fn doc(&self) -> &'a Value {
        self.doc
    }

    pub fn opt_str(&self, paths: &[&[&str]]) -> Option<String> {
        first(self.doc, paths, string_at)
    }

    pub fn opt_i64(&self, paths: &[&[&str]]) -> Option<i64> {
        first(self.doc, paths, i64_at)
    }

    pub fn opt_f64(&self, paths: &[&[&str]]) -> Option<f64> {
        first(self.doc, paths, f64_at)
    }

    pub fn opt_timestamp(&self, paths: &[&[&str]]) -> Option<DateTime<Utc>> {
        first(self.doc, paths, timestamp_at)
    }

    pub fn opt_array(&self, paths: &[&[&str]]) -> Option<&'a Vec<Value>> {
        first(self.doc, paths, array_at)
    }

    pub fn opt_object(&self, paths: &[&[&str]]) -> Option<&'a Map<String, Value>> {
        first(self.doc, paths, object_at)
    }

    pub fn str_or(&mut self, paths: &[&[&str]], default: &str) -> String {
        let value = self.opt_str(paths);
        self.or(value, default.to_string())
    }

    pub fn i64_or(&mut self, paths: &[&[&str]], default: i64) -> i64 {
        let value = self.opt_i64(paths);
        self.or(value, default)
    }

    pub fn timestamp_or(&mut self, paths: &[&[&str]], default: DateTime<Utc>) -> DateTime<Utc> {
        let value = self.opt_timestamp(paths);
        self.or(value, default)
    }

    /// Unwraps `value`, falling back to `default` and flagging the reader.
    pub fn or<T>(&mut self, value: Option<T>, default: T) -> T {
        match value {
            Some(value) => value,
            None => {
                self.defaulted = true;
                default
            }
        }
    }

    pub fn mark_defaulted(&mut self) {
        self.defaulted = true;
    }

    pub fn defaulted(&self) -> bool {
        self.defaulted
    }
}

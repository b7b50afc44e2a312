//! Request parameters.
//!
//! Every request's path variables, query string and body (URL-encoded form,
//! multipart form, JSON object or msgpack map) are folded into one
//! [`ParamStore`]: a string-keyed map of loosely typed [`Value`]s with typed
//! accessors on top.
//!
//! Accessors never fail a request. Each comes in two flavours:
//!
//! - `get_*` returns `Option<T>`; `None` means absent *or* not coercible.
//! - the bare name (`string`, `u64`, `strings`, ...) returns the zero value
//!   instead, for handlers that validate later.
//!
//! ```rust
//! use apiary::params::{ParamStore, Value};
//!
//! let mut params = ParamStore::default();
//! params.insert("id", Value::from("42"));
//! params.insert("tags", Value::from("1,2,3"));
//!
//! assert_eq!(params.get_u64("id"), Some(42));
//! assert_eq!(params.u64s("tags"), vec![1, 2, 3]);
//! assert_eq!(params.get_i8("missing"), None);
//! ```

mod casing;
mod imbue;
mod parse;

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub use casing::{DEFAULT_ACRONYMS, snake_case, snake_to_camel};
pub use imbue::{Binder, CustomSetter, Setter};

/// `time` layouts tried after RFC 3339, in order.
const DATE_ONLY: &str = "%Y-%m-%d";
const DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";
const HTML_DATE_TIME_LOCAL: &str = "%Y-%m-%dT%H:%M";

/// Replacement logged in place of a filtered parameter.
const FILTERED: &str = "FILTERED";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Parsing and binding knobs shared by every request a router serves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParamConfig {
    /// Lower-case words that become fully upper-case when a parameter key is
    /// mapped onto a field name: `user_id` → `UserID`.
    pub known_abbreviations: Vec<String>,

    /// Keys whose values are replaced with `["FILTERED"]` in request logs.
    pub filtered_keys: Vec<String>,

    /// Upper bound for a whole multipart body.
    pub max_multipart_bytes: u64,

    /// Upper bound for any request body. The server stops reading past it
    /// and answers 413 before parsing starts.
    pub max_body_bytes: u64,
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            known_abbreviations: ["id", "json", "html", "xml"].map(String::from).to_vec(),
            filtered_keys: Vec::new(),
            max_multipart_bytes: 10_000_000,
            max_body_bytes: 10_000_000,
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// Nested parameter map.
pub type Map = BTreeMap<String, Value>;

/// One parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Map),
    File(FileHeader),
    Time(DateTime<Utc>),
}

/// An uploaded multipart file part.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FileHeader {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Value {
    /// JSON rendering for logs and echoing. Bytes become lossy UTF-8, files
    /// their metadata, times RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Uint(u) => Json::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::File(file) => serde_json::json!({
                "filename": file.filename,
                "content_type": file.content_type,
                "size": file.size(),
            }),
            Value::Time(t) => Json::String(t.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(s) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self { Value::Uint(u) }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self { Value::Bytes(b) }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self { Value::Time(t) }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Float)
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// ── ParamStore ────────────────────────────────────────────────────────────────

/// The per-request parameter map.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    values: Map,
    binary: bool,
    config: Arc<ParamConfig>,
}

impl ParamStore {
    pub fn new(config: Arc<ParamConfig>) -> Self {
        Self { values: Map::new(), binary: false, config }
    }

    pub fn from_values(values: Map, config: Arc<ParamConfig>) -> Self {
        Self { values, binary: false, config }
    }

    pub fn config(&self) -> &ParamConfig { &self.config }
    pub fn values(&self) -> &Map { &self.values }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Whether the body arrived msgpack-encoded.
    pub fn is_binary(&self) -> bool { self.binary }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Raw lookup. `a.b.c` descends through nested maps; a non-map on the way
    /// reads as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Map(map) => map.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        let mut parts = key.split('.');
        let mut current = self.values.get_mut(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Map(map) => map.get_mut(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    // ── strings ───────────────────────────────────────────────────────────────

    /// Borrowed string value. Byte values are not valid here; use
    /// [`get_string`](Self::get_string).
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Str(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Trimmed string, or `""`.
    pub fn string(&self, key: &str) -> String {
        self.get_string(key).map(|s| s.trim().to_owned()).unwrap_or_default()
    }

    // ── integers ──────────────────────────────────────────────────────────────

    /// Numbers arriving as text go through a float parse first so `"3"` and
    /// `"3.0"` both read as 3; fractions truncate.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            Value::Float(f) => float_to_i64(*f),
            Value::Str(s) => parse_float(s).and_then(float_to_i64),
            Value::Bytes(b) => bytes_as_float(b).and_then(float_to_i64),
            _ => None,
        }
    }

    pub fn i64(&self, key: &str) -> i64 { self.get_i64(key).unwrap_or_default() }

    pub fn get_i32(&self, key: &str) -> Option<i32> { self.get_narrow(key) }
    pub fn i32(&self, key: &str) -> i32 { self.get_i32(key).unwrap_or_default() }

    pub fn get_i16(&self, key: &str) -> Option<i16> { self.get_narrow(key) }
    pub fn i16(&self, key: &str) -> i16 { self.get_i16(key).unwrap_or_default() }

    pub fn get_i8(&self, key: &str) -> Option<i8> { self.get_narrow(key) }
    pub fn i8(&self, key: &str) -> i8 { self.get_i8(key).unwrap_or_default() }

    fn get_narrow<T: TryFrom<i64>>(&self, key: &str) -> Option<T> {
        self.get_i64(key).and_then(|v| T::try_from(v).ok())
    }

    /// Like [`get_i64`](Self::get_i64) but negative input is rejected.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Uint(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Float(f) => float_to_u64(*f),
            Value::Str(s) => parse_float(s).and_then(float_to_u64),
            Value::Bytes(b) => bytes_as_float(b).and_then(float_to_u64),
            _ => None,
        }
    }

    pub fn u64(&self, key: &str) -> u64 { self.get_u64(key).unwrap_or_default() }

    // ── bool / float ──────────────────────────────────────────────────────────

    /// Native booleans, or any integer-coercible value (non-zero is `true`).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            _ => self.get_i64(key).map(|i| i != 0),
        }
    }

    pub fn bool(&self, key: &str) -> bool { self.get_bool(key).unwrap_or_default() }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Uint(u) => Some(*u as f64),
            Value::Str(s) => parse_float(s),
            Value::Bytes(b) => bytes_as_float(b),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> f64 { self.get_f64(key).unwrap_or_default() }

    // ── slices ────────────────────────────────────────────────────────────────

    /// A list of scalars, or a comma-separated string.
    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            Value::Str(s) => Some(s.split(',').map(str::to_owned).collect()),
            Value::Bytes(b) => {
                Some(String::from_utf8_lossy(b).split(',').map(str::to_owned).collect())
            }
            Value::List(items) => items.iter().map(scalar_string).collect(),
            _ => None,
        }
    }

    pub fn strings(&self, key: &str) -> Vec<String> { self.get_strings(key).unwrap_or_default() }

    /// Any element that fails to parse makes the whole slice `None`.
    pub fn get_i64s(&self, key: &str) -> Option<Vec<i64>> {
        self.get_list(key, |s| s.parse().ok(), |v| match v {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            Value::Float(f) => float_to_i64(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn i64s(&self, key: &str) -> Vec<i64> { self.get_i64s(key).unwrap_or_default() }

    pub fn get_u64s(&self, key: &str) -> Option<Vec<u64>> {
        self.get_list(key, |s| s.parse().ok(), |v| match v {
            Value::Uint(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Float(f) => float_to_u64(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn u64s(&self, key: &str) -> Vec<u64> { self.get_u64s(key).unwrap_or_default() }

    pub fn get_f64s(&self, key: &str) -> Option<Vec<f64>> {
        self.get_list(key, parse_float, |v| match v {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Uint(u) => Some(*u as f64),
            Value::Str(s) => parse_float(s),
            _ => None,
        })
    }

    pub fn f64s(&self, key: &str) -> Vec<f64> { self.get_f64s(key).unwrap_or_default() }

    fn get_list<T>(
        &self,
        key: &str,
        piece: impl Fn(&str) -> Option<T>,
        element: impl Fn(&Value) -> Option<T>,
    ) -> Option<Vec<T>> {
        let split = |s: &str| -> Option<Vec<T>> {
            if s.is_empty() {
                return None;
            }
            s.split(',').map(|p| piece(p.trim())).collect()
        };
        match self.get(key)? {
            Value::Str(s) => split(s),
            Value::Bytes(b) => split(&String::from_utf8_lossy(b)),
            Value::List(items) => items.iter().map(element).collect(),
            _ => None,
        }
    }

    // ── bytes / time / json / file ────────────────────────────────────────────

    /// Raw bytes, or base64 text decoded once and cached back into the store.
    pub fn get_bytes(&mut self, key: &str) -> Option<Vec<u8>> {
        let decoded = match self.get(key)? {
            Value::Bytes(b) => return Some(b.clone()),
            Value::Str(s) => match STANDARD.decode(s) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(key, error = %e, "failed to decode base64 parameter");
                    return None;
                }
            },
            _ => return None,
        };
        if let Some(slot) = self.get_mut(key) {
            *slot = Value::Bytes(decoded.clone());
        }
        Some(decoded)
    }

    pub fn bytes(&mut self, key: &str) -> Vec<u8> { self.get_bytes(key).unwrap_or_default() }

    pub fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_time_in(key, &Utc)
    }

    pub fn time(&self, key: &str) -> DateTime<Utc> { self.get_time(key).unwrap_or_default() }

    /// Tries a stored time first, then RFC 3339, `YYYY-MM-DD`,
    /// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM`. Layouts without an
    /// offset are read as wall-clock time in `tz`.
    pub fn get_time_in<Tz: TimeZone>(&self, key: &str, tz: &Tz) -> Option<DateTime<Tz>> {
        match self.get(key)? {
            Value::Time(t) => Some(t.with_timezone(tz)),
            Value::Str(s) => parse_time(s, tz),
            _ => None,
        }
    }

    /// A nested map, or a string holding a JSON object.
    pub fn get_json(&self, key: &str) -> Option<Map> {
        if let Some(Value::Map(map)) = self.get(key) {
            return Some(map.clone());
        }
        let raw = self.get_string(key)?;
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw).ok()?;
        Some(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }

    pub fn json(&self, key: &str) -> Map { self.get_json(key).unwrap_or_default() }

    pub fn get_file(&self, key: &str) -> Option<&FileHeader> {
        match self.get(key)? {
            Value::File(file) => Some(file),
            _ => None,
        }
    }

    // ── gating ────────────────────────────────────────────────────────────────

    /// Whether every key is present (top level only), plus the missing ones.
    pub fn has_all(&self, keys: &[&str]) -> (bool, Vec<String>) {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !self.values.contains_key(**k))
            .map(|k| (*k).to_owned())
            .collect();
        (missing.is_empty(), missing)
    }

    /// Drops every key not in `allowed` (ASCII case-insensitive).
    pub fn permit(&mut self, allowed: &[&str]) {
        self.values
            .retain(|key, _| allowed.iter().any(|a| a.eq_ignore_ascii_case(key)));
    }

    /// Binds every parameter the binder recognises onto `target`.
    /// Returns how many fields were set.
    pub fn imbue<T>(&self, target: &mut T, binder: &Binder<T>) -> usize {
        binder.imbue(self, target)
    }

    /// The values as JSON, safe to log: filtered keys masked, bytes as text.
    pub fn filtered(&self) -> serde_json::Value {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if self.config.filtered_keys.iter().any(|f| f.eq_ignore_ascii_case(k)) {
                    serde_json::json!([FILTERED])
                } else {
                    v.to_json()
                };
                (k.clone(), shown)
            })
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

/// Removes duplicates, keeping first occurrences in order.
pub fn unique_u64(values: &[u64]) -> Vec<u64> {
    let mut seen = std::collections::HashSet::with_capacity(values.len());
    values.iter().copied().filter(|v| seen.insert(*v)).collect()
}

// ── coercion helpers ──────────────────────────────────────────────────────────

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn bytes_as_float(b: &[u8]) -> Option<f64> {
    std::str::from_utf8(b).ok().and_then(parse_float)
}

fn float_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    (t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

fn float_to_u64(f: f64) -> Option<u64> {
    let t = f.trunc();
    (f >= 0.0 && t < u64::MAX as f64).then_some(t as u64)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Uint(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn parse_time<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(tz));
    }
    let naive = NaiveDate::parse_from_str(s, DATE_ONLY)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .or_else(|| NaiveDateTime::parse_from_str(s, DATE_TIME).ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, HTML_DATE_TIME_LOCAL).ok())?;
    tz.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    fn store(pairs: &[(&str, Value)]) -> ParamStore {
        let values = pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect();
        ParamStore::from_values(values, Arc::default())
    }

    #[test]
    fn integer_accessors_parse_text() {
        let p = store(&[("n", Value::from("42")), ("bad", Value::from("abc"))]);

        assert_eq!(p.get_i8("n"), Some(42));
        assert_eq!(p.get_i16("n"), Some(42));
        assert_eq!(p.get_i32("n"), Some(42));
        assert_eq!(p.get_i64("n"), Some(42));
        assert_eq!(p.get_u64("n"), Some(42));

        assert_eq!(p.get_i8("bad"), None);
        assert_eq!(p.get_i32("bad"), None);
        assert_eq!(p.get_i64("bad"), None);
        assert_eq!(p.get_u64("bad"), None);
        assert_eq!(p.i64("bad"), 0);
    }

    #[test]
    fn integers_tolerate_float_text_and_json_numbers() {
        let p = store(&[
            ("a", Value::from("3.0")),
            ("b", Value::Float(7.9)),
            ("c", Value::Int(-5)),
            ("d", Value::Bytes(b"12".to_vec())),
        ]);
        assert_eq!(p.i64("a"), 3);
        assert_eq!(p.i64("b"), 7);
        assert_eq!(p.i64("c"), -5);
        assert_eq!(p.i64("d"), 12);
    }

    #[test]
    fn sized_integers_reject_out_of_range() {
        let p = store(&[("big", Value::from("300")), ("huge", Value::Int(1 << 40))]);
        assert_eq!(p.get_i8("big"), None);
        assert_eq!(p.get_i16("big"), Some(300));
        assert_eq!(p.get_i32("huge"), None);
        assert_eq!(p.get_i64("huge"), Some(1 << 40));
    }

    #[test]
    fn unsigned_rejects_negatives() {
        let p = store(&[("s", Value::from("-1")), ("i", Value::Int(-1)), ("f", Value::Float(-0.5))]);
        assert_eq!(p.get_u64("s"), None);
        assert_eq!(p.get_u64("i"), None);
        assert_eq!(p.get_u64("f"), None);
        assert_eq!(p.u64("s"), 0);
    }

    #[test]
    fn bool_from_native_or_integer() {
        let p = store(&[
            ("t", Value::Bool(true)),
            ("one", Value::from("1")),
            ("zero", Value::Int(0)),
            ("word", Value::from("yes")),
        ]);
        assert_eq!(p.get_bool("t"), Some(true));
        assert_eq!(p.get_bool("one"), Some(true));
        assert_eq!(p.get_bool("zero"), Some(false));
        assert_eq!(p.get_bool("word"), None);
    }

    #[test]
    fn string_convenience_trims() {
        let p = store(&[("name", Value::from("  Ada  ")), ("raw", Value::Bytes(b"bytes".to_vec()))]);
        assert_eq!(p.get_string("name").as_deref(), Some("  Ada  "));
        assert_eq!(p.string("name"), "Ada");
        assert_eq!(p.string("raw"), "bytes");
        assert_eq!(p.string("missing"), "");
    }

    #[test]
    fn u64_slice_from_csv() {
        let p = store(&[("ids", Value::from("1,2,3")), ("empty", Value::from(""))]);
        assert_eq!(p.get_u64s("ids"), Some(vec![1, 2, 3]));
        assert_eq!(p.get_u64s("empty"), None);
        assert!(p.u64s("empty").is_empty());
    }

    #[test]
    fn numeric_slices_short_circuit_on_bad_element() {
        let p = store(&[
            ("ints", Value::from("1,x,3")),
            ("floats", Value::from("1.5,2.5")),
            ("list", Value::List(vec![Value::Int(1), Value::Float(2.0), Value::from("3")])),
        ]);
        assert_eq!(p.get_i64s("ints"), None);
        assert_eq!(p.get_f64s("floats"), Some(vec![1.5, 2.5]));
        assert_eq!(p.get_i64s("list"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn string_slice_from_list_or_csv() {
        let p = store(&[
            ("csv", Value::from("a,b")),
            ("list", Value::List(vec![Value::from("x"), Value::Int(2)])),
        ]);
        assert_eq!(p.strings("csv"), vec!["a", "b"]);
        assert_eq!(p.strings("list"), vec!["x", "2"]);
    }

    #[test]
    fn bytes_decode_base64_once() {
        let mut p = store(&[("blob", Value::from("aGVsbG8=")), ("junk", Value::from("%%%"))]);
        assert_eq!(p.get_bytes("blob"), Some(b"hello".to_vec()));
        assert_eq!(p.get("blob"), Some(&Value::Bytes(b"hello".to_vec())));
        assert_eq!(p.get_bytes("junk"), None);
        assert_eq!(p.get("junk"), Some(&Value::from("%%%")));
    }

    #[test]
    fn time_layouts_in_order() {
        let p = store(&[
            ("rfc", Value::from("2024-03-01T10:20:30Z")),
            ("date", Value::from("2024-03-01")),
            ("datetime", Value::from("2024-03-01 10:20:30")),
            ("html", Value::from("2024-03-01T10:20")),
            ("bad", Value::from("yesterday")),
        ]);
        assert_eq!(p.time("rfc").hour(), 10);
        assert_eq!(p.time("date").hour(), 0);
        assert_eq!(p.time("datetime").second(), 30);
        assert_eq!(p.time("html").minute(), 20);
        assert_eq!(p.get_time("bad"), None);
    }

    #[test]
    fn time_reads_wall_clock_in_zone() {
        let p = store(&[("at", Value::from("2024-03-01 10:00:00"))]);
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("valid offset");
        let t = p.get_time_in("at", &plus_two).expect("parses");
        assert_eq!(t.hour(), 10);
        assert_eq!(t.with_timezone(&Utc).hour(), 8);
    }

    #[test]
    fn json_from_map_or_text() {
        let mut nested = Map::new();
        nested.insert("a".into(), Value::Int(1));
        let p = store(&[
            ("map", Value::Map(nested.clone())),
            ("text", Value::from(r#"{"a":1}"#)),
            ("array", Value::from("[1,2]")),
        ]);
        assert_eq!(p.get_json("map"), Some(nested.clone()));
        assert_eq!(p.get_json("text"), Some(nested));
        assert_eq!(p.get_json("array"), None);
    }

    #[test]
    fn dotted_keys_descend_maps() {
        let mut inner = Map::new();
        inner.insert("city".into(), Value::from("Oslo"));
        let p = store(&[("address", Value::Map(inner)), ("flat", Value::from("x"))]);
        assert_eq!(p.get_str("address.city"), Some("Oslo"));
        assert_eq!(p.get("address.zip"), None);
        assert_eq!(p.get("flat.deeper"), None);
    }

    #[test]
    fn permit_keeps_only_allowed_keys() {
        let mut p = store(&[
            ("email", Value::from("a@b.c")),
            ("first_name", Value::from("Ada")),
            ("last_name", Value::from("Lovelace")),
            ("is_admin", Value::Bool(true)),
        ]);
        p.permit(&["email", "FIRST_NAME"]);
        let keys: Vec<&str> = p.values().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["email", "first_name"]);
    }

    #[test]
    fn has_all_reports_missing() {
        let p = store(&[("email", Value::from("a@b.c"))]);
        assert_eq!(p.has_all(&["email"]), (true, vec![]));
        assert_eq!(p.has_all(&["email", "id", "name"]), (false, vec!["id".to_owned(), "name".to_owned()]));
    }

    #[test]
    fn filtered_masks_sensitive_keys() {
        let config = ParamConfig { filtered_keys: vec!["password".into()], ..ParamConfig::default() };
        let mut p = ParamStore::new(Arc::new(config));
        p.insert("Password", Value::from("hunter2"));
        p.insert("blob", Value::Bytes(b"hi".to_vec()));
        p.insert("n", Value::Uint(3));

        assert_eq!(
            p.filtered(),
            serde_json::json!({"Password": ["FILTERED"], "blob": "hi", "n": 3})
        );
    }

    #[test]
    fn unique_keeps_first_occurrence() {
        assert_eq!(unique_u64(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}

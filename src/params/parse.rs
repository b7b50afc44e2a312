//! Folding a request into a [`ParamStore`].
//!
//! Sources, in precedence order:
//!
//! 1. JSON object or msgpack body (whole-body encodings),
//! 2. form fields from a URL-encoded or multipart body,
//! 3. query-string fields,
//! 4. uploaded files (they replace a same-named form field),
//!
//! and finally route variables, which overwrite anything else. Within one
//! source the first occurrence of a key wins. A body that fails to decode is
//! logged and contributes nothing; parsing itself never fails.

use std::sync::Arc;

use bytes::Bytes;
use http::Method;

use super::{FileHeader, Map, ParamConfig, ParamStore, Value};
use crate::request::Request;

const MULTIPART: &str = "multipart/form-data";
const FORM: &str = "application/x-www-form-urlencoded";
const JSON: &str = "application/json";
const MSGPACK: [&str; 2] = ["application/x-msgpack", "application/msgpack"];

impl ParamStore {
    pub async fn parse(req: &Request, config: Arc<ParamConfig>) -> Self {
        let content_type = req.header("content-type").unwrap_or_default();
        let kind = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let body = req.body_bytes().clone();

        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut files = Map::new();
        if kind == MULTIPART {
            read_multipart(content_type, body.clone(), config.max_multipart_bytes, &mut pairs, &mut files)
                .await;
        } else if kind == FORM && carries_form(req.method()) {
            pairs.extend(url::form_urlencoded::parse(&body).into_owned());
        }
        if let Some(query) = req.query() {
            pairs.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }

        let mut fields = Map::new();
        for (key, raw) in pairs {
            fields.entry(key).or_insert_with(|| form_value(&raw));
        }
        fields.extend(files);

        let mut binary = false;
        let mut values = if kind == JSON && !body.is_empty() {
            match decode_json(&body) {
                Some(mut values) => {
                    merge_missing(&mut values, fields);
                    values
                }
                None => fields,
            }
        } else if MSGPACK.contains(&kind.as_str()) {
            binary = true;
            let mut values = decode_msgpack(&body);
            merge_missing(&mut values, fields);
            values
        } else {
            fields
        };

        for (key, raw) in req.route_params() {
            values.insert(key.clone(), route_value(key, raw));
        }

        Self { values, binary, config }
    }
}

fn carries_form(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn form_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else {
        Value::Str(raw.to_owned())
    }
}

/// Route variables naming an id are numeric when they parse as one.
fn route_value(key: &str, raw: &str) -> Value {
    if key.contains("id") {
        if let Ok(id) = raw.parse::<u64>() {
            return Value::Uint(id);
        }
    }
    Value::Str(raw.to_owned())
}

fn merge_missing(values: &mut Map, extra: Map) {
    for (key, value) in extra {
        values.entry(key).or_insert(value);
    }
}

async fn read_multipart(
    content_type: &str,
    body: Bytes,
    limit: u64,
    pairs: &mut Vec<(String, String)>,
    files: &mut Map,
) {
    let boundary = match multer::parse_boundary(content_type) {
        Ok(boundary) => boundary,
        Err(e) => {
            tracing::warn!(error = %e, "multipart request without a usable boundary");
            return;
        }
    };

    let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let constraints =
        multer::Constraints::new().size_limit(multer::SizeLimit::new().whole_stream(limit));
    let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse multipart form");
                break;
            }
        };
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let filename = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(ToString::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(field = %name, error = %e, "failed to read multipart field");
                break;
            }
        };

        match filename {
            Some(filename) => {
                files
                    .entry(name)
                    .or_insert(Value::File(FileHeader { filename, content_type, data }));
            }
            None => pairs.push((name, String::from_utf8_lossy(&data).into_owned())),
        }
    }
}

fn decode_json(body: &[u8]) -> Option<Map> {
    match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body) {
        Ok(obj) => Some(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "content-type is application/json but the body is not a JSON object");
            None
        }
    }
}

/// Reads values back to back. Maps contribute their entries; arrays are read
/// as alternating keys and values.
fn decode_msgpack(body: &[u8]) -> Map {
    let mut values = Map::new();
    let mut cursor = body;

    while !cursor.is_empty() {
        match rmpv::decode::read_value(&mut cursor) {
            Ok(rmpv::Value::Map(entries)) => {
                for (key, value) in entries {
                    if let Some(key) = msgpack_key(&key) {
                        values.entry(key).or_insert_with(|| Value::from(value));
                    }
                }
            }
            Ok(rmpv::Value::Array(items)) => {
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    if let Some(key) = msgpack_key(&key) {
                        values.entry(key).or_insert_with(|| Value::from(value));
                    }
                }
            }
            Ok(other) => {
                tracing::warn!(value = %other, "ignoring msgpack value that is neither a map nor a key/value array");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode msgpack body");
                break;
            }
        }
    }

    values
}

fn msgpack_key(key: &rmpv::Value) -> Option<String> {
    match key {
        rmpv::Value::String(s) => s.as_str().map(str::to_owned),
        rmpv::Value::Binary(b) => String::from_utf8(b.clone()).ok(),
        _ => None,
    }
}

impl From<rmpv::Value> for Value {
    fn from(v: rmpv::Value) -> Self {
        match v {
            rmpv::Value::Nil => Value::Null,
            rmpv::Value::Boolean(b) => Value::Bool(b),
            rmpv::Value::Integer(i) => {
                if let Some(i) = i.as_i64() {
                    Value::Int(i)
                } else {
                    i.as_u64().map_or(Value::Null, Value::Uint)
                }
            }
            rmpv::Value::F32(f) => Value::Float(f64::from(f)),
            rmpv::Value::F64(f) => Value::Float(f),
            rmpv::Value::String(s) => {
                if s.is_str() {
                    Value::Str(s.into_str().unwrap_or_default())
                } else {
                    Value::Bytes(s.into_bytes())
                }
            }
            rmpv::Value::Binary(b) => Value::Bytes(b),
            rmpv::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            rmpv::Value::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .filter_map(|(k, v)| msgpack_key(&k).map(|k| (k, Value::from(v))))
                    .collect(),
            ),
            rmpv::Value::Ext(_, data) => Value::Bytes(data),
        }
    }
}

//! Field-filtered JSON encoding.
//!
//! Models are serialized with serde, their top-level keys converted with
//! [`snake_case`], and every key missing from an allow-list is dropped. This
//! is the only gate between a model and the wire: a field not on the list is
//! never sent.
//!
//! ```rust
//! use apiary::encode::Encoder;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct Account { id: u64, email: String, password: String }
//!
//! let account = Account { id: 1, email: "a@b.c".into(), password: "secret".into() };
//! let json = Encoder::default().to_value(&account, &["id", "email"]).unwrap();
//! assert_eq!(json, serde_json::json!({"id": 1, "email": "a@b.c"}));
//! ```
//!
//! Flattened (`#[serde(flatten)]`) structs join their parent before gating,
//! and keys starting with `_` are never emitted.

use std::collections::BTreeMap;
use std::io;

use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::params::{DEFAULT_ACRONYMS, snake_case};
use crate::response::Response;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("expected an object or a list of objects, found {0}")]
    NotAnObject(&'static str),

    #[error("write: {0}")]
    Io(#[from] io::Error),
}

/// A hierarchical allow-list: plain field names, or per-field branches.
#[derive(Debug, Clone, PartialEq)]
pub enum Allowed {
    Fields(Vec<String>),
    Nested(BTreeMap<String, Allowed>),
}

impl Allowed {
    pub fn fields(names: &[&str]) -> Self {
        Allowed::Fields(names.iter().map(|n| (*n).to_owned()).collect())
    }

    pub fn nested<K: Into<String>>(branches: impl IntoIterator<Item = (K, Allowed)>) -> Self {
        Allowed::Nested(branches.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct Encoder {
    acronyms: Vec<String>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_ACRONYMS.map(String::from).to_vec())
    }
}

impl Encoder {
    /// `acronyms` are the upper-case runs kept as one word by [`snake_case`].
    pub fn new(acronyms: Vec<String>) -> Self {
        Self { acronyms }
    }

    /// Filters one object, or a list of objects.
    ///
    /// For a list, the keys dropped from the first element are dropped from
    /// every element; lists are assumed homogeneous. An empty list is `[]`.
    pub fn to_value<T, S>(&self, value: &T, allowed: &[S]) -> Result<Value, EncodeError>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        self.filter(serde_json::to_value(value)?, allowed)
    }

    pub fn encode<W, T, S>(&self, mut w: W, value: &T, allowed: &[S]) -> Result<(), EncodeError>
    where
        W: io::Write,
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let filtered = self.to_value(value, allowed)?;
        serde_json::to_writer(&mut w, &filtered)?;
        Ok(())
    }

    /// Writes an object field by field, following `allowed` into nested
    /// objects. A [`Allowed::Fields`] branch is filtered like
    /// [`to_value`](Self::to_value).
    pub fn encode_hierarchy<W, T>(&self, mut w: W, value: &T, allowed: &Allowed) -> Result<(), EncodeError>
    where
        W: io::Write,
        T: Serialize + ?Sized,
    {
        self.write_branch(&mut w, serde_json::to_value(value)?, allowed)
    }

    fn write_branch<W: io::Write>(&self, w: &mut W, raw: Value, allowed: &Allowed) -> Result<(), EncodeError> {
        let branches = match allowed {
            Allowed::Fields(fields) => {
                serde_json::to_writer(&mut *w, &self.filter(raw, fields)?)?;
                return Ok(());
            }
            Allowed::Nested(branches) => branches,
        };

        w.write_all(b"{")?;
        let mut first = true;
        for (key, value) in self.keyed(raw)? {
            let Some(branch) = branches.get(&key) else {
                continue;
            };
            if !first {
                w.write_all(b",")?;
            }
            first = false;
            serde_json::to_writer(&mut *w, &key)?;
            w.write_all(b":")?;
            self.write_branch(w, value, branch)?;
        }
        w.write_all(b"}")?;
        Ok(())
    }

    fn filter<S: AsRef<str>>(&self, raw: Value, allowed: &[S]) -> Result<Value, EncodeError> {
        let permitted = |key: &str| allowed.iter().any(|a| a.as_ref() == key);

        match raw {
            Value::Array(items) => {
                let mut objects = items
                    .into_iter()
                    .map(|item| self.keyed(item))
                    .collect::<Result<Vec<_>, _>>()?;
                let denied: Vec<String> = objects
                    .first()
                    .map(|first| first.keys().filter(|k| !permitted(k.as_str())).cloned().collect())
                    .unwrap_or_default();
                for object in &mut objects {
                    for key in &denied {
                        object.remove(key);
                    }
                }
                Ok(Value::Array(objects.into_iter().map(Value::Object).collect()))
            }
            other => {
                let mut object = self.keyed(other)?;
                object.retain(|k, _| permitted(k.as_str()));
                Ok(Value::Object(object))
            }
        }
    }

    /// Top-level keys in wire form; `_`-prefixed keys removed.
    fn keyed(&self, raw: Value) -> Result<Map<String, Value>, EncodeError> {
        let object = match raw {
            Value::Object(object) => object,
            other => return Err(EncodeError::NotAnObject(kind(&other))),
        };
        Ok(object
            .into_iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (snake_case(&k, &self.acronyms), v))
            .collect())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// [`Encoder::encode`] with the default acronyms.
pub fn json_encode<W, T>(w: W, value: &T, allowed: &[&str]) -> Result<(), EncodeError>
where
    W: io::Write,
    T: Serialize + ?Sized,
{
    Encoder::default().encode(w, value, allowed)
}

/// [`Encoder::encode_hierarchy`] with the default acronyms.
pub fn json_encode_hierarchy<W, T>(w: W, value: &T, allowed: &Allowed) -> Result<(), EncodeError>
where
    W: io::Write,
    T: Serialize + ?Sized,
{
    Encoder::default().encode_hierarchy(w, value, allowed)
}

/// A JSON [`Response`] holding the filtered `value`.
pub fn return_json_encode<T>(status: StatusCode, value: &T, allowed: &[&str]) -> Result<Response, EncodeError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(&Encoder::default().to_value(value, allowed)?)?;
    Ok(Response::builder().status(status).json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Account {
        #[serde(rename = "ID")]
        id: u64,
        email: String,
        password: String,
    }

    #[derive(Serialize)]
    struct Audit {
        created_by: String,
        #[serde(rename = "_version")]
        version: u32,
    }

    #[derive(Serialize)]
    struct Document {
        title: String,
        #[serde(flatten)]
        audit: Audit,
        owner: Account,
    }

    fn account(id: u64) -> Account {
        Account { id, email: format!("{id}@example.com"), password: "secret".into() }
    }

    #[test]
    fn object_keeps_only_allowed_keys() {
        let json = Encoder::default().to_value(&account(1), &["id", "email"]).expect("encodes");
        assert_eq!(json, json!({"id": 1, "email": "1@example.com"}));
    }

    #[test]
    fn empty_list_is_an_empty_array() {
        let empty: Vec<Account> = Vec::new();
        let mut out = Vec::new();
        json_encode(&mut out, &empty, &["id"]).expect("encodes");
        assert_eq!(out, b"[]");
    }

    #[test]
    fn list_applies_first_elements_deny_set() {
        let json = Encoder::default()
            .to_value(&[account(1), account(2)], &["id"])
            .expect("encodes");
        assert_eq!(json, json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn flattened_fields_join_parent_and_underscore_keys_drop() {
        let doc = Document {
            title: "Notes".into(),
            audit: Audit { created_by: "ada".into(), version: 3 },
            owner: account(7),
        };
        let json = Encoder::default()
            .to_value(&doc, &["title", "created_by", "_version", "version"])
            .expect("encodes");
        assert_eq!(json, json!({"title": "Notes", "created_by": "ada"}));
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = Encoder::default().to_value(&42, &["id"]).expect_err("not an object");
        assert!(matches!(err, EncodeError::NotAnObject("a number")));
    }

    #[test]
    fn hierarchy_writes_nested_objects() {
        let doc = Document {
            title: "Notes".into(),
            audit: Audit { created_by: "ada".into(), version: 3 },
            owner: account(7),
        };
        let allowed = Allowed::nested([("owner", Allowed::fields(&["id", "email"]))]);
        let mut out = Vec::new();
        json_encode_hierarchy(&mut out, &doc, &allowed).expect("encodes");
        let json: Value = serde_json::from_slice(&out).expect("valid json");
        assert_eq!(json, json!({"owner": {"id": 7, "email": "7@example.com"}}));
    }

    #[test]
    fn response_carries_status_and_json() {
        let res = return_json_encode(StatusCode::CREATED, &account(3), &["id"]).expect("encodes");
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"id":3}"#);
    }
}

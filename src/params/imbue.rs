//! Binding parameters onto typed records.
//!
//! A [`Binder`] is a table from exported field names to setters. Imbuing walks
//! the parameters, converts each key with [`snake_to_camel`], and hands the
//! coerced value to the matching setter. Keys with no matching field are
//! ignored; fields of a kind the binder cannot coerce go to the optional custom
//! setter or are skipped with a debug log. Binding never fails a request.
//!
//! ```rust
//! use apiary::params::{Binder, ParamStore, Setter, Value};
//!
//! #[derive(Default)]
//! struct Login { user_id: u64, email: String }
//!
//! let binder = Binder::new()
//!     .field("UserID", Setter::U64(|t: &mut Login, v| t.user_id = v))
//!     .field("Email", Setter::String(|t: &mut Login, v| t.email = v));
//!
//! let mut params = ParamStore::default();
//! params.insert("user_id", Value::from("7"));
//! params.insert("email", Value::from(" a@b.c "));
//!
//! let mut login = Login::default();
//! params.imbue(&mut login, &binder);
//! assert_eq!(login.user_id, 7);
//! assert_eq!(login.email, "a@b.c");
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{ParamStore, Value, snake_to_camel};

/// How a field takes its value. Each variant holds the assignment for one
/// target kind; the binder performs the coercion.
pub enum Setter<T> {
    String(fn(&mut T, String)),
    U64(fn(&mut T, u64)),
    I64(fn(&mut T, i64)),
    Bool(fn(&mut T, bool)),
    F32(fn(&mut T, f32)),
    F64(fn(&mut T, f64)),
    Strings(fn(&mut T, Vec<String>)),
    I64s(fn(&mut T, Vec<i64>)),
    U64s(fn(&mut T, Vec<u64>)),
    F64s(fn(&mut T, Vec<f64>)),
    Time(fn(&mut T, DateTime<Utc>)),
    OptionalTime(fn(&mut T, Option<DateTime<Utc>>)),
    /// No built-in coercion; routed to the binder's custom setter.
    Other,
}

/// Receives `(target, field name, raw value)` for [`Setter::Other`] fields.
pub type CustomSetter<T> = fn(&mut T, &str, &Value);

pub struct Binder<T> {
    fields: HashMap<&'static str, Setter<T>>,
    custom: Option<CustomSetter<T>>,
}

impl<T> Default for Binder<T> {
    fn default() -> Self {
        Self { fields: HashMap::new(), custom: None }
    }
}

impl<T> Binder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, setter: Setter<T>) -> Self {
        self.fields.insert(name, setter);
        self
    }

    pub fn custom(mut self, setter: CustomSetter<T>) -> Self {
        self.custom = Some(setter);
        self
    }

    /// Exported field names this binder knows, in no particular order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    /// Coercion failures assign the zero value, as the convenience accessors do.
    pub fn imbue(&self, params: &ParamStore, target: &mut T) -> usize {
        let abbreviations = &params.config().known_abbreviations;
        let mut bound = 0;

        for (key, raw) in params.values() {
            let name = snake_to_camel(key, true, abbreviations);
            let Some(setter) = self.fields.get(name.as_str()) else {
                tracing::trace!(key = %key, "no field for parameter");
                continue;
            };

            match setter {
                Setter::String(set) => set(target, params.string(key)),
                Setter::U64(set) => set(target, params.u64(key)),
                Setter::I64(set) => set(target, params.i64(key)),
                Setter::Bool(set) => set(target, params.bool(key)),
                Setter::F32(set) => set(target, params.f64(key) as f32),
                Setter::F64(set) => set(target, params.f64(key)),
                Setter::Strings(set) => set(target, params.strings(key)),
                Setter::I64s(set) => set(target, params.i64s(key)),
                Setter::U64s(set) => set(target, params.u64s(key)),
                Setter::F64s(set) => set(target, params.f64s(key)),
                Setter::Time(set) => set(target, params.time(key)),
                Setter::OptionalTime(set) => set(target, params.get_time(key)),
                Setter::Other => match self.custom {
                    Some(custom) => custom(target, &name, raw),
                    None => {
                        tracing::debug!(key = %key, field = %name, "skipping parameter with unsupported field kind");
                        continue;
                    }
                },
            }
            bound += 1;
        }

        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[derive(Default)]
    struct Record {
        id: u64,
        first_name: String,
        score: f32,
        active: bool,
        tags: Vec<String>,
        offsets: Vec<i64>,
        born: Option<DateTime<Utc>>,
        raw_json: Option<Value>,
    }

    fn binder() -> Binder<Record> {
        Binder::new()
            .field("ID", Setter::U64(|r: &mut Record, v| r.id = v))
            .field("FirstName", Setter::String(|r: &mut Record, v| r.first_name = v))
            .field("Score", Setter::F32(|r: &mut Record, v| r.score = v))
            .field("Active", Setter::Bool(|r: &mut Record, v| r.active = v))
            .field("Tags", Setter::Strings(|r: &mut Record, v| r.tags = v))
            .field("Offsets", Setter::I64s(|r: &mut Record, v| r.offsets = v))
            .field("Born", Setter::OptionalTime(|r: &mut Record, v| r.born = v))
            .field("RawJSON", Setter::Other)
    }

    fn params(pairs: &[(&str, Value)]) -> ParamStore {
        let mut store = ParamStore::default();
        for (k, v) in pairs {
            store.insert(*k, v.clone());
        }
        store
    }

    #[test]
    fn binds_by_converted_key() {
        let p = params(&[
            ("id", Value::from("12")),
            ("first_name", Value::from("  Grace ")),
            ("score", Value::Float(1.5)),
            ("active", Value::Int(1)),
            ("tags", Value::from("a,b")),
            ("offsets", Value::List(vec![Value::Int(-1), Value::Int(2)])),
            ("born", Value::from("1906-12-09")),
        ]);
        let mut r = Record::default();
        let bound = p.imbue(&mut r, &binder());

        assert_eq!(bound, 7);
        assert_eq!(r.id, 12);
        assert_eq!(r.first_name, "Grace");
        assert_eq!(r.score, 1.5);
        assert!(r.active);
        assert_eq!(r.tags, vec!["a", "b"]);
        assert_eq!(r.offsets, vec![-1, 2]);
        assert_eq!(r.born.map(|t| t.year()), Some(1906));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let p = params(&[("nickname", Value::from("amazing")), ("id", Value::from("3"))]);
        let mut r = Record::default();
        assert_eq!(p.imbue(&mut r, &binder()), 1);
        assert_eq!(r.id, 3);
    }

    #[test]
    fn bad_values_assign_zero() {
        let p = params(&[("id", Value::from("abc"))]);
        let mut r = Record { id: 99, ..Record::default() };
        p.imbue(&mut r, &binder());
        assert_eq!(r.id, 0);
    }

    #[test]
    fn other_fields_need_a_custom_setter() {
        let p = params(&[("raw_json", Value::from("{}"))]);

        let mut r = Record::default();
        assert_eq!(p.imbue(&mut r, &binder()), 0);
        assert!(r.raw_json.is_none());

        let custom = binder().custom(|r: &mut Record, field, value| {
            if field == "RawJSON" {
                r.raw_json = Some(value.clone());
            }
        });
        assert_eq!(p.imbue(&mut r, &custom), 1);
        assert_eq!(r.raw_json, Some(Value::from("{}")));
    }
}

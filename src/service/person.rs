//! The person model.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::{Binder, Setter};

/// Columns a create may write.
pub const CREATE_COLUMNS: [&str; 4] = ["email", "first_name", "last_name", "middle_name"];

/// Columns an update may write.
pub const UPDATE_COLUMNS: [&str; 4] = ["email", "first_name", "last_name", "middle_name"];

/// Columns a (soft) delete may write.
pub const DELETE_COLUMNS: [&str; 1] = ["is_deleted"];

/// Fields shown to clients.
pub const ALL_FIELDS: [&str; 7] = [
    "created_at",
    "email",
    "first_name",
    "id",
    "last_name",
    "middle_name",
    "modified_at",
];

const MAX_NAME_LENGTH: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    #[serde(rename = "ID")]
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Parameter binding table, keyed by exported field name.
pub static BINDER: LazyLock<Binder<Person>> = LazyLock::new(|| {
    Binder::new()
        .field("ID", Setter::U64(|p: &mut Person, v| p.id = v))
        .field("Email", Setter::String(|p: &mut Person, v| p.email = v))
        .field("FirstName", Setter::String(|p: &mut Person, v| p.first_name = v))
        .field("MiddleName", Setter::String(|p: &mut Person, v| p.middle_name = v))
        .field("LastName", Setter::String(|p: &mut Person, v| p.last_name = v))
        .field("IsDeleted", Setter::Bool(|p: &mut Person, v| p.is_deleted = v))
        .field("CreatedAt", Setter::Time(|p: &mut Person, v| p.created_at = v))
        .field("ModifiedAt", Setter::OptionalTime(|p: &mut Person, v| p.modified_at = v))
});

impl Person {
    /// Normalizes the fields a client may send.
    pub fn sanitize(&mut self) {
        self.email = sanitize_email(&self.email);
        self.first_name = sanitize_formal_name(&self.first_name);
        self.middle_name = sanitize_formal_name(&self.middle_name);
        self.last_name = sanitize_formal_name(&self.last_name);
    }

    /// Sanitizes, then checks every rule.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        self.sanitize();

        let mut errors = Vec::new();
        if self.email.is_empty() {
            errors.push(FieldError::new("email", "cannot be blank"));
        } else if !is_email(&self.email) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("middle_name", &self.middle_name),
        ] {
            if value.chars().count() > MAX_NAME_LENGTH {
                errors.push(FieldError::new(field, "the length must be between 0 and 50"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(ValidationError(errors)) }
    }

    /// Copies the listed columns from `other`. Unknown column names are ignored.
    pub fn assign_columns(&mut self, other: &Person, columns: &[&str]) {
        for column in columns {
            match *column {
                "email" => self.email = other.email.clone(),
                "first_name" => self.first_name = other.first_name.clone(),
                "middle_name" => self.middle_name = other.middle_name.clone(),
                "last_name" => self.last_name = other.last_name.clone(),
                "is_deleted" => self.is_deleted = other.is_deleted,
                _ => {}
            }
        }
    }

    /// Template data for the welcome email.
    pub fn email_data(&self, support_email: &str) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "email": self.email,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "support_email": support_email,
        })
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

/// Every rule a model failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub Vec<FieldError>);

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        f.write_str(".")
    }
}

impl ValidationError {
    /// `{field: message}` for the public error body.
    pub fn to_json(&self) -> serde_json::Value {
        self.0
            .iter()
            .map(|e| (e.field.to_owned(), serde_json::Value::from(e.message)))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

// ── Sanitizing ────────────────────────────────────────────────────────────────

/// Lower-cased, `mailto:` dropped, only address characters kept.
fn sanitize_email(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered.strip_prefix("mailto:").unwrap_or(&lowered);
    stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
        .collect()
}

/// Letters, digits, spaces and `-` `.` `,` `'` only.
fn sanitize_formal_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '.' | ',' | '\''))
        .collect::<String>()
        .trim()
        .to_owned()
}

fn is_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

//! Outbound email.
//!
//! Templates are plain text with `{{ field }}` placeholders filled from a
//! JSON object. Delivery goes through the [`Mailer`] trait; [`LogMailer`]
//! records each send as a log line and keeps a copy for inspection.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("template data: {0}")]
    Data(#[from] serde_json::Error),

    #[error("template data must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),

    #[error("email has no recipients")]
    NoRecipients,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

// ── Templates ─────────────────────────────────────────────────────────────────

/// A parsed `{{ field }}` template.
#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Field(String),
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, MailError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_owned()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or(MailError::Unclosed(offset + start))?;
            parts.push(Part::Field(after[..end].trim().to_owned()));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_owned()));
        }
        Ok(Self { parts })
    }

    /// Fills each placeholder from the matching field of `data`. Missing
    /// fields and nulls render empty; strings render without quotes.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, MailError> {
        let value = serde_json::to_value(data)?;
        let object = match &value {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Array(_) => return Err(MailError::NotAnObject("array")),
            _ => return Err(MailError::NotAnObject("scalar")),
        };

        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Field(name) => match object.get(name) {
                    None | Some(serde_json::Value::Null) => {}
                    Some(serde_json::Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(out)
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub from_name: String,
    pub from_address: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub tags: Vec<String>,
}

impl Email {
    /// A blank message from the configured sender.
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            from_name: config.from_name.clone(),
            from_address: config.from_address(),
            ..Self::default()
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Logs every message at `info` and remembers it.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: Mutex<Vec<Email>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Email>> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sent(&self) -> Vec<Email> {
        self.lock().clone()
    }
}

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        if email.recipients.is_empty() {
            return Err(MailError::NoRecipients);
        }
        info!(
            from = %email.from_address,
            to = ?email.recipients,
            subject = %email.subject,
            tags = ?email.tags,
            "email sent"
        );
        self.lock().push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_fields() {
        let template = Template::parse("Hi {{ first_name }} ({{email}}), id {{ id }}.{{ missing }}")
            .expect("template");
        let out = template
            .render(&json!({"first_name": "Ada", "email": "ada@example.com", "id": 7}))
            .expect("render");
        assert_eq!(out, "Hi Ada (ada@example.com), id 7.");
    }

    #[test]
    fn unclosed_placeholder_fails() {
        let err = Template::parse("abc {{ name").expect_err("unclosed");
        assert!(matches!(err, MailError::Unclosed(4)));
    }

    #[test]
    fn data_must_be_an_object() {
        let template = Template::parse("{{ a }}").expect("template");
        assert!(matches!(template.render(&[1, 2]), Err(MailError::NotAnObject("array"))));
    }

    #[test]
    fn log_mailer_records_sends() {
        let mailer = LogMailer::new();
        let config = EmailConfig {
            from_name: "Acme".into(),
            from_username: "hello".into(),
            from_domain: "example.com".into(),
        };

        let mut email = Email::from_config(&config);
        assert!(matches!(mailer.send(&email), Err(MailError::NoRecipients)));

        email.recipients.push("ada@example.com".into());
        email.subject = "Welcome".into();
        mailer.send(&email).expect("send");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from_address, "hello@example.com");
    }
}

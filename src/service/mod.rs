//! The person service: model, persistence, background jobs and endpoints.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apiary::Server;
//! use apiary::config::AppConfig;
//! use apiary::service::{AppState, routes};
//!
//! # async fn run() -> Result<(), apiary::Error> {
//! let config = AppConfig::load()?;
//! let state = Arc::new(AppState::in_memory(&config)?);
//! let app = routes::router(&config, Arc::clone(&state));
//!
//! Server::bind(([0, 0, 0, 0], config.port())).serve(app).await?;
//! state.queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod person;
pub mod queue;
pub mod routes;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, MemoryCache};
use crate::config::{AppConfig, EmailConfig};
use crate::notify::{LogMailer, MailError, Mailer, Template};

use queue::WorkQueue;
use store::{MemoryStore, PersonStore};

const WELCOME_TEMPLATE: &str = "Hi {{ first_name }},\n\n\
Welcome aboard! Your account is registered to {{ email }}.\n\
Questions? Write to {{ support_email }}.\n";

/// Everything the handlers share.
pub struct AppState {
    pub store: Arc<dyn PersonStore>,
    pub cache: Arc<dyn Cache>,
    pub mailer: Arc<dyn Mailer>,
    pub queue: WorkQueue,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub email: EmailConfig,
    welcome: Template,
}

impl AppState {
    /// Must run inside a tokio runtime; the queue worker starts here.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn PersonStore>,
        cache: Arc<dyn Cache>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, MailError> {
        Ok(Self {
            store,
            cache,
            mailer,
            queue: WorkQueue::start(config.database.queue_capacity),
            cache_enabled: config.cache.enabled,
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
            email: config.email.clone(),
            welcome: Template::parse(WELCOME_TEMPLATE)?,
        })
    }

    /// State backed by the in-process store, cache and mailer.
    pub fn in_memory(config: &AppConfig) -> Result<Self, MailError> {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(LogMailer::new()),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;

    use crate::request::Request;

    pub(crate) const CONFIG: &str = r#"
environment = "development"
server_port = "3000"
unauthorized_error = "unauthorized"

[basic_auth]
user = "john"
password = "pass876"

[email]
from_name = "Acme"
from_username = "hello"
from_domain = "example.com"
"#;

    pub(crate) fn config() -> AppConfig {
        AppConfig::from_toml(CONFIG, |_| None).expect("valid config")
    }

    pub(crate) fn state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(&config()).expect("state"))
    }

    pub(crate) fn request(method: Method, uri: &str, body: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/x-www-form-urlencoded");
        }
        let body = body.map(|b| Bytes::copy_from_slice(b.as_bytes())).unwrap_or_default();
        Request::new(builder.body(body).expect("valid request"), None)
    }

    #[tokio::test]
    async fn welcome_template_parses() {
        let state = state();
        let out = state
            .welcome
            .render(&serde_json::json!({"first_name": "Ada", "email": "a@b.co", "support_email": "s@b.co"}))
            .expect("render");
        assert!(out.starts_with("Hi Ada,"));
        assert!(out.contains("a@b.co"));
    }
}

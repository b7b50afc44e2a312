//! The person service.
//!
//! Run with:
//!   API_ENVIRONMENT=development RUST_LOG=info cargo run
//!
//! Try:
//!   curl http://localhost:3000/persons
//!   curl -u john:pass876 -X POST http://localhost:3000/persons \
//!        -d 'email=ada@example.com&first_name=Ada'
//!   curl http://localhost:3000/persons/1
//!   curl -u john:pass876 -X PUT http://localhost:3000/persons -d 'id=1&last_name=Lovelace'
//!   curl -u john:pass876 -X DELETE 'http://localhost:3000/persons?id=1'

use std::sync::Arc;

use apiary::config::AppConfig;
use apiary::service::{AppState, routes};
use apiary::{Error, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let state = Arc::new(AppState::in_memory(&config)?);
    let app = routes::router(&config, Arc::clone(&state));

    let served = Server::bind(([0, 0, 0, 0], config.port())).serve(app).await;

    // Queued emails still go out after the listener closes.
    state.queue.shutdown().await;
    served
}

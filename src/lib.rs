//! # apiary
//!
//! A small JSON API framework on hyper, and the person service built on it.
//!
//! Every request passes through one pipeline before its handler:
//!
//! - parameters from the path, query string and body (form, multipart, JSON
//!   or msgpack) are folded into one [`ParamStore`](params::ParamStore);
//! - the client IP is resolved and a correlation ID assigned;
//! - CORS headers are computed;
//! - "request started" and "request completed" lines are logged around the
//!   handler, which runs inside a `request` span.
//!
//! Responses can be filtered down to an allow-list of fields with
//! [`encode`], and errors carry a uniform JSON envelope ([`ApiError`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use apiary::{ApiError, Request, Response, Router, Server};
//! use apiary::encode::return_json_encode;
//! use http::{Method, StatusCode};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User { id: u64, email: String, password_hash: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apiary::Error> {
//!     let app = Router::new().on(Method::GET, "/users/{id}", get_user);
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, ApiError> {
//!     let Some(id) = req.params().get_u64("id") else {
//!         return Err(ApiError::from_request(&req, "bad id", "invalid id", 400, serde_json::Value::Null));
//!     };
//!     let user = User { id, email: "a@b.co".into(), password_hash: "…".into() };
//!     return_json_encode(StatusCode::OK, &user, &["id", "email"])
//!         .map_err(|e| ApiError::from_request(&req, e.to_string(), "encoding failed", 500, serde_json::Value::Null))
//! }
//! ```

mod api_error;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod cache;
pub mod config;
pub mod encode;
pub mod health;
pub mod middleware;
pub mod notify;
pub mod params;
pub mod service;

pub use api_error::{ApiError, ERR_CODE_UNKNOWN};
pub use error::Error;
pub use handler::{BoxedHandler, Handler, boxed};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, run, shutdown_signal};
pub use writer::ResponseWriter;

//! Load-balancer health check.
//!
//! ```rust,no_run
//! use apiary::{Router, health};
//! use http::Method;
//!
//! let app = Router::new()
//!     .on_quiet(Method::GET, "/health", health::health)
//!     .on_quiet(Method::HEAD, "/health", health::health);
//! ```

use http::StatusCode;

use crate::{Request, Response};

/// `200 OK` with an empty body. No dependencies are consulted.
pub async fn health(_req: Request) -> Response {
    Response::status(StatusCode::OK)
}

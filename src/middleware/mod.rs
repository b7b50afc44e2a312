//! Middleware layer.
//!
//! A middleware is a function from one [`BoxedHandler`] to another. The
//! request pipeline itself (parameters, client IP, correlation ID, CORS and
//! start/end logging) is applied by the [`Router`](crate::Router) to every
//! route; the middleware here wraps individual handlers inside it.
//!
//! - [`basic_auth`] gates a handler behind HTTP basic authentication.
//! - [`no_cache`] strips conditional request headers and marks the response
//!   uncacheable.
//! - [`Stack`] composes several middleware into one.
//!
//! ```rust
//! use apiary::middleware::{BasicAuth, Stack, basic_auth, no_cache};
//! use apiary::{Request, Response, Router};
//! use http::Method;
//!
//! async fn delete(_: Request) -> Response { Response::text("gone") }
//!
//! let admin = Stack::new()
//!     .with(no_cache)
//!     .with(basic_auth(BasicAuth::new("admin", "s3cret"), "unauthorized".into()));
//!
//! let router = Router::new().on(Method::DELETE, "/persons", admin.wrap(delete));
//! ```

mod auth;
mod cors;
mod no_cache;
pub(crate) mod trace;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler, unboxed};

pub use auth::{BasicAuth, basic_auth};
pub use cors::Cors;
pub use no_cache::no_cache;

/// A shareable middleware.
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// An ordered list of middleware.
///
/// The first middleware added is the outermost layer: it sees the request
/// first and the response last.
#[derive(Clone, Default)]
pub struct Stack {
    middlewares: Vec<Middleware>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, middleware: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize { self.middlewares.len() }
    pub fn is_empty(&self) -> bool { self.middlewares.is_empty() }

    /// Wraps `handler` in every middleware, innermost last-added.
    pub fn wrap(&self, handler: impl Handler) -> impl Handler {
        let wrapped = self
            .middlewares
            .iter()
            .rev()
            .fold(handler.into_boxed_handler(), |inner, middleware| middleware(inner));
        unboxed(wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::boxed;
    use crate::{Request, Response};
    use bytes::Bytes;

    fn tag(label: &'static str) -> impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static {
        move |next: BoxedHandler| {
            boxed(move |req: Request| {
                let next = Arc::clone(&next);
                async move {
                    let res = next.call(req).await;
                    let body = format!("{label}({})", String::from_utf8_lossy(res.body()));
                    Response::text(body)
                }
            })
        }
    }

    #[tokio::test]
    async fn first_added_is_outermost() {
        let stack = Stack::new().with(tag("outer")).with(tag("inner"));
        let handler = boxed(stack.wrap(|_: Request| async { Response::text("core") }));

        let req = Request::new(http::Request::new(Bytes::new()), None);
        let res = handler.call(req).await;
        assert_eq!(res.body(), b"outer(inner(core))");
    }

    #[tokio::test]
    async fn empty_stack_is_identity() {
        let stack = Stack::new();
        assert!(stack.is_empty());
        let handler = boxed(stack.wrap(|_: Request| async { "plain" }));
        let res = handler.call(Request::new(http::Request::new(Bytes::new()), None)).await;
        assert_eq!(res.body(), b"plain");
    }
}

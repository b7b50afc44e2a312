//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every request, matched or
//! not, runs through the same pipeline (parameters, client IP, correlation
//! ID, CORS, logging) before its handler.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{ALLOW, HeaderValue, LOCATION};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::api_error::ApiError;
use crate::handler::{BoxedHandler, Handler, boxed};
use crate::middleware::Cors;
use crate::middleware::trace::Pipeline;
use crate::params::ParamConfig;
use crate::request::Request;
use crate::response::Response;

struct Route {
    handler: BoxedHandler,
    logged: bool,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or drive it directly with [`Router::handle`]. Each builder call returns
/// `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    pipeline: Pipeline,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
    preflight: BoxedHandler,
    redirect_trailing_slash: bool,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            pipeline: Pipeline::default(),
            not_found: boxed(not_found),
            method_not_allowed: boxed(method_not_allowed),
            preflight: boxed(|_: Request| async { Response::status(StatusCode::OK) }),
            redirect_trailing_slash: true,
        }
    }

    /// Register a handler for a method + path pair, with start/end logging.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use apiary::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn find(_: Request) -> Response { Response::text("") }
    /// # async fn create(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/persons/{id}", find)
    ///     .on(Method::POST, "/persons",      create);
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler, true)
    }

    /// Like [`on`](Self::on) but without the start/end log lines. Parameters,
    /// correlation ID and CORS still apply.
    pub fn on_quiet(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler, false)
    }

    fn add(mut self, method: Method, path: &str, handler: impl Handler, logged: bool) -> Self {
        let route = Route { handler: handler.into_boxed_handler(), logged };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn cors(mut self, cors: Cors) -> Self {
        self.pipeline.cors = cors;
        self
    }

    /// Paths (exact match) whose requests are never logged, e.g. `/health`.
    pub fn skip_logging<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.pipeline.skip_logging_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn params_config(mut self, config: ParamConfig) -> Self {
        self.pipeline.params = Arc::new(config);
        self
    }

    /// Largest request body the server reads for this router.
    pub(crate) fn max_body_bytes(&self) -> usize {
        usize::try_from(self.pipeline.params.max_body_bytes).unwrap_or(usize::MAX)
    }

    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = handler.into_boxed_handler();
        self
    }

    /// Handler for a path that matches under other methods only. The router
    /// adds the `Allow` header.
    pub fn method_not_allowed(mut self, handler: impl Handler) -> Self {
        self.method_not_allowed = handler.into_boxed_handler();
        self
    }

    /// Whether a miss that would match with (or without) a trailing slash is
    /// redirected there. On by default.
    pub fn redirect_trailing_slash(mut self, enabled: bool) -> Self {
        self.redirect_trailing_slash = enabled;
        self
    }

    /// Routes one request through the pipeline and returns its response.
    pub async fn handle(&self, mut req: Request) -> Response {
        let path = req.path().to_owned();

        if let Some((handler, logged, params)) = self.lookup(req.method(), &path) {
            req.set_route_params(params);
            return self.pipeline.process(req, handler, logged).await;
        }

        if *req.method() == Method::OPTIONS {
            return self.pipeline.process(req, Arc::clone(&self.preflight), false).await;
        }

        if self.redirect_trailing_slash {
            if let Some(location) = self.trailing_slash_redirect(req.method(), &path, req.query()) {
                return self.pipeline.process(req, redirect(location), true).await;
            }
        }

        let allowed = self.allowed_methods(&path);
        if allowed.is_empty() {
            return self.pipeline.process(req, Arc::clone(&self.not_found), true).await;
        }

        let mut res = self
            .pipeline
            .process(req, Arc::clone(&self.method_not_allowed), true)
            .await;
        match HeaderValue::from_str(&allowed.join(", ")) {
            Ok(value) => {
                res.headers_mut().insert(ALLOW, value);
            }
            Err(e) => tracing::warn!(error = %e, "could not build Allow header"),
        }
        res
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, bool, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(&matched.value.handler), matched.value.logged, params))
    }

    /// Methods registered for `path`, sorted, plus `OPTIONS`.
    fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut allowed: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.to_string())
            .collect();
        if allowed.is_empty() {
            return allowed;
        }
        if !allowed.iter().any(|m| m == "OPTIONS") {
            allowed.push(Method::OPTIONS.to_string());
        }
        allowed.sort();
        allowed
    }

    fn trailing_slash_redirect(&self, method: &Method, path: &str, query: Option<&str>) -> Option<String> {
        let tree = self.routes.get(method)?;
        let alternate = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed.to_owned(),
            Some(_) => return None,
            None => format!("{path}/"),
        };
        tree.at(&alternate).ok()?;
        Some(match query {
            Some(query) => format!("{alternate}?{query}"),
            None => alternate,
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn redirect(location: String) -> BoxedHandler {
    boxed(move |req: Request| {
        let location = location.clone();
        async move {
            let status = if matches!(*req.method(), Method::GET | Method::HEAD) {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::PERMANENT_REDIRECT
            };
            let mut res = Response::status(status);
            match HeaderValue::from_str(&location) {
                Ok(value) => {
                    res.headers_mut().insert(LOCATION, value);
                }
                Err(e) => tracing::warn!(error = %e, "could not build Location header"),
            }
            res
        }
    })
}

async fn not_found(req: Request) -> ApiError {
    ApiError::from_request(
        &req,
        format!("404 occurred: {}", req.uri()),
        "Whoops - this request is not recognized",
        StatusCode::NOT_FOUND.as_u16(),
        serde_json::Value::Null,
    )
}

async fn method_not_allowed(req: Request) -> ApiError {
    ApiError::from_request(
        &req,
        format!("405 occurred: {} method: {}", req.uri(), req.method()),
        "Whoops - this method is not allowed",
        StatusCode::METHOD_NOT_ALLOWED.as_u16(),
        serde_json::Value::Null,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(method: Method, uri: &str) -> Request {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("origin", "https://example.com")
            .body(Bytes::new())
            .expect("valid request");
        Request::new(req, None)
    }

    async fn echo_id(req: Request) -> Response {
        Response::text(format!("{}:{}", req.param("id").unwrap_or("-"), req.params().u64("id")))
    }

    fn router() -> Router {
        Router::new()
            .on(Method::GET, "/persons/{id}", echo_id)
            .on(Method::DELETE, "/persons/{id}", echo_id)
            .on(Method::GET, "/persons", |_: Request| async { "list" })
    }

    #[tokio::test]
    async fn route_params_reach_handler_and_params() {
        let res = router().handle(request(Method::GET, "/persons/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"42:42");
        assert_eq!(res.header("access-control-allow-origin"), Some("https://example.com"));
    }

    #[tokio::test]
    async fn unknown_path_is_a_json_404() {
        let res = router().handle(request(Method::GET, "/nope")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(res.body()).expect("json");
        assert_eq!(body["message"], "Whoops - this request is not recognized");
        assert_eq!(body["code"], 404);
        assert_eq!(res.header("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let res = router().handle(request(Method::PUT, "/persons/1")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("DELETE, GET, OPTIONS"));
        let body: serde_json::Value = serde_json::from_slice(res.body()).expect("json");
        assert_eq!(body["message"], "Whoops - this method is not allowed");
    }

    #[tokio::test]
    async fn options_anywhere_is_a_preflight() {
        let res = router().handle(request(Method::OPTIONS, "/anything/at/all")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.body().is_empty());
        assert_eq!(res.header("access-control-allow-origin"), Some("https://example.com"));
        assert!(res.header("access-control-allow-methods").is_some());
    }

    #[tokio::test]
    async fn trailing_slash_redirects() {
        let res = router().handle(request(Method::GET, "/persons/?page=2")).await;
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.header("location"), Some("/persons?page=2"));

        let res = router().handle(request(Method::DELETE, "/persons/3/")).await;
        assert_eq!(res.status_code(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(res.header("location"), Some("/persons/3"));
    }

    #[tokio::test]
    async fn redirect_can_be_disabled() {
        let res = router()
            .redirect_trailing_slash(false)
            .handle(request(Method::GET, "/persons/"))
            .await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_not_found() {
        let res = router()
            .not_found(|_: Request| async { StatusCode::GONE })
            .handle(request(Method::GET, "/nope"))
            .await;
        assert_eq!(res.status_code(), StatusCode::GONE);
    }
}

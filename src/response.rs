//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. For bodies that must
//! be inspected before they are committed, use a
//! [`ResponseWriter`](crate::ResponseWriter) instead.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, VARY};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    MsgPack,      // application/msgpack
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::MsgPack     => "application/msgpack",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use apiary::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/persons/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Serializes `data` as JSON with the given status.
    ///
    /// A payload that fails to serialize becomes a bare `500`; the failure is
    /// logged, never sent.
    pub fn respond<T: Serialize + ?Sized>(code: StatusCode, data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(bytes) => Self::builder().status(code).json(bytes),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response payload");
                Self::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup returning the value as `&str`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Adds every header from `defaults` whose name the response has not set.
    ///
    /// Middleware computes headers before the handler runs; anything the
    /// handler set itself wins. `Vary` is the exception: its tokens are
    /// unioned, so a handler's `Vary` never drops the pipeline's `Origin`.
    pub(crate) fn merge_missing_headers(&mut self, defaults: HeaderMap) {
        // Follow-up values of a multi-valued header arrive with `None` names.
        let mut current: Option<(HeaderName, bool)> = None;
        for (name, value) in defaults {
            if let Some(name) = name {
                let absent = !self.headers.contains_key(&name);
                current = Some((name, absent));
            }
            match &current {
                Some((name, _)) if *name == VARY => self.merge_vary(&value),
                Some((name, true)) => {
                    self.headers.append(name.clone(), value);
                }
                _ => {}
            }
        }
    }

    fn merge_vary(&mut self, value: &HeaderValue) {
        let Ok(tokens) = value.to_str() else { return };
        for token in tokens.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let present = self
                .headers
                .get_all(VARY)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .any(|t| t.trim() == "*" || t.trim().eq_ignore_ascii_case(token));
            if !present {
                if let Ok(v) = HeaderValue::from_str(token) {
                    self.headers.append(VARY, v);
                }
            }
        }
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json.as_str(), body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type.as_str(), body.into())
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Lets handlers use `?` with any error type that is itself a response,
/// such as [`ApiError`](crate::ApiError).
impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_handler_headers() {
        let mut res = Response::builder()
            .header("access-control-allow-origin", "https://handler.example")
            .no_body();

        let mut defaults = HeaderMap::new();
        defaults.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        defaults.insert("vary", HeaderValue::from_static("Origin"));
        res.merge_missing_headers(defaults);

        assert_eq!(res.header("access-control-allow-origin"), Some("https://handler.example"));
        assert_eq!(res.header("vary"), Some("Origin"));
    }

    #[test]
    fn merge_unions_vary_tokens() {
        let mut res = Response::builder().header("vary", "Accept-Encoding").no_body();

        let mut defaults = HeaderMap::new();
        defaults.insert("vary", HeaderValue::from_static("Origin"));
        res.merge_missing_headers(defaults.clone());
        res.merge_missing_headers(defaults);

        let vary: Vec<_> = res.headers().get_all("vary").iter().filter_map(|v| v.to_str().ok()).collect();
        assert_eq!(vary, ["Accept-Encoding", "Origin"]);
    }

    #[test]
    fn respond_serializes_with_status() {
        let res = Response::respond(StatusCode::CREATED, &serde_json::json!({"ok": true}));
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"ok":true}"#);
    }
}

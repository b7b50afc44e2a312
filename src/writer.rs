//! Status-capturing response writer.
//!
//! Handlers that build their body incrementally, or that want to inspect a
//! body before sending it (for caching), write through a [`ResponseWriter`]
//! and return it. In buffered ("no-write") mode the bytes land in a side
//! buffer and reach the client only after [`commit`](ResponseWriter::commit).
//!
//! ```rust
//! use std::io::Write;
//! use apiary::{IntoResponse, Request, ResponseWriter};
//! use bytes::Bytes;
//!
//! let req = Request::new(http::Request::new(Bytes::new()), None);
//! let mut w = ResponseWriter::buffered(&req);
//! w.write_all(b"[]").unwrap();
//! assert_eq!(w.buffer(), b"[]");
//! w.commit();
//!
//! let res = w.into_response();
//! assert_eq!(res.status_code(), http::StatusCode::OK);
//! assert_eq!(res.body(), b"[]");
//! ```

use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

use crate::request::Request;
use crate::response::{IntoResponse, Response};

#[derive(Debug)]
pub struct ResponseWriter {
    headers: HeaderMap,
    body: Vec<u8>,
    buffer: Vec<u8>,
    cache_identifiers: Vec<String>,
    cache_ttl: Duration,
    ip_address: String,
    method: Method,
    no_write: bool,
    request_id: String,
    status: Option<StatusCode>,
    url: String,
    user_agent: String,
}

impl ResponseWriter {
    /// A writer that sends what it is given.
    pub fn new(req: &Request) -> Self {
        Self {
            headers: HeaderMap::new(),
            body: Vec::new(),
            buffer: Vec::new(),
            cache_identifiers: Vec::new(),
            cache_ttl: Duration::ZERO,
            ip_address: req.client_ip().to_owned(),
            method: req.method().clone(),
            no_write: false,
            request_id: req.request_id().to_owned(),
            status: None,
            url: req.uri().to_string(),
            user_agent: req.user_agent().to_owned(),
        }
    }

    /// A writer in no-write mode: body bytes are held back until committed.
    pub fn buffered(req: &Request) -> Self {
        Self { no_write: true, ..Self::new(req) }
    }

    pub fn ip_address(&self) -> &str { &self.ip_address }
    pub fn method(&self) -> &Method { &self.method }
    pub fn request_id(&self) -> &str { &self.request_id }
    pub fn url(&self) -> &str { &self.url }
    pub fn user_agent(&self) -> &str { &self.user_agent }
    pub fn is_no_write(&self) -> bool { self.no_write }

    /// Status written so far; `None` until a header or body write.
    pub fn status(&self) -> Option<StatusCode> { self.status }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Appends body bytes. The first write without an explicit status
    /// records `200 OK`.
    pub fn write(&mut self, data: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        if self.no_write {
            self.buffer.extend_from_slice(data);
        } else {
            self.body.extend_from_slice(data);
        }
    }

    /// Bytes held back in no-write mode.
    pub fn buffer(&self) -> &[u8] { &self.buffer }

    /// Sends the held-back bytes and leaves no-write mode.
    pub fn commit(&mut self) {
        self.body.append(&mut self.buffer);
        self.no_write = false;
    }

    pub fn add_cache_identifier(&mut self, identifier: impl Into<String>) {
        self.cache_identifiers.push(identifier.into());
    }

    pub fn cache_identifiers(&self) -> &[String] { &self.cache_identifiers }

    pub fn set_cache_ttl(&mut self, ttl: Duration) { self.cache_ttl = ttl; }
    pub fn cache_ttl(&self) -> Duration { self.cache_ttl }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Uncommitted buffer bytes are dropped.
impl IntoResponse for ResponseWriter {
    fn into_response(self) -> Response {
        Response {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.headers,
            body: Bytes::from(self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/persons?page=2")
            .header("user-agent", "curl/8")
            .header("x-forwarded-for", "9.9.9.9")
            .body(Bytes::new())
            .expect("valid request");
        Request::new(req, None)
    }

    #[test]
    fn copies_request_identity() {
        let req = request();
        let w = ResponseWriter::new(&req);
        assert_eq!(w.ip_address(), "9.9.9.9");
        assert_eq!(*w.method(), Method::POST);
        assert_eq!(w.request_id(), req.request_id());
        assert_eq!(w.url(), "/persons?page=2");
        assert_eq!(w.user_agent(), "curl/8");
    }

    #[test]
    fn first_write_defaults_status_to_ok() {
        let mut w = ResponseWriter::new(&request());
        assert_eq!(w.status(), None);
        w.write(b"x");
        assert_eq!(w.status(), Some(StatusCode::OK));
    }

    #[test]
    fn explicit_status_survives_writes() {
        let mut w = ResponseWriter::new(&request());
        w.write_header(StatusCode::CREATED);
        w.write(b"{}");
        let res = w.into_response();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), b"{}");
    }

    #[test]
    fn buffered_bytes_need_commit() {
        let mut w = ResponseWriter::buffered(&request());
        w.write(b"cached");
        w.add_cache_identifier("persons");
        assert_eq!(w.buffer(), b"cached");
        assert_eq!(w.cache_identifiers(), ["persons".to_owned()]);

        let res = w.into_response();
        assert!(res.body().is_empty());
    }
}

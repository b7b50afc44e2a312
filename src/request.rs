//! Incoming HTTP request type and its request-scoped context.
//!
//! Besides the HTTP parts, a [`Request`] carries values the pipeline derives
//! once per request: the client IP, a correlation ID and the parsed
//! [`ParamStore`]. They live on the request itself, so nothing is shared
//! between concurrent requests.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::header::{HeaderMap, USER_AGENT};
use http::{Method, Uri};

use crate::params::{ParamConfig, ParamStore};

/// An incoming HTTP request with its body collected.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    route_params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    params: ParamStore,
    params_parsed: bool,
    client_ip: OnceLock<String>,
    request_id: OnceLock<String>,
}

impl Request {
    pub fn new(req: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            route_params: HashMap::new(),
            remote_addr,
            params: ParamStore::default(),
            params_parsed: false,
            client_ip: OnceLock::new(),
            request_id: OnceLock::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn body_bytes(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Values that are not visible ASCII read
    /// as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/persons/{id}`, `req.param("id")` on `/persons/42` returns
    /// `Some("42")`. Use [`params`](Self::params) for the typed value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.route_params.get(key).map(String::as_str)
    }

    pub fn route_params(&self) -> &HashMap<String, String> { &self.route_params }

    pub(crate) fn set_route_params(&mut self, params: HashMap<String, String>) {
        self.route_params = params;
    }

    /// Client address: first `X-Forwarded-For` entry, else the socket peer.
    /// Empty when neither yields a valid IP. Resolved once per request.
    pub fn client_ip(&self) -> &str {
        self.client_ip
            .get_or_init(|| resolve_client_ip(&self.headers, self.remote_addr))
    }

    /// Correlation ID for this request, generated on first use.
    pub fn request_id(&self) -> &str {
        self.request_id
            .get_or_init(|| uuid::Uuid::new_v4().to_string())
    }

    /// Parameters from path, query and body. Empty until the pipeline (or
    /// [`parse_params`](Self::parse_params)) has run.
    pub fn params(&self) -> &ParamStore { &self.params }
    pub fn params_mut(&mut self) -> &mut ParamStore { &mut self.params }

    /// Parses parameters once; later calls keep the first result.
    pub async fn parse_params(&mut self, config: Arc<ParamConfig>) -> &mut ParamStore {
        if !self.params_parsed {
            self.params = ParamStore::parse(self, config).await;
            self.params_parsed = true;
        }
        &mut self.params
    }
}

fn resolve_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    // An entry that is not an address (`unknown`, a hostname) counts as absent.
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|raw| normalize_ip(raw.trim()))
        .or_else(|| remote.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}

/// Accepts a bare IP, an `ip:port` pair or a bracketed IPv6 address.
fn normalize_ip(raw: &str) -> Option<IpAddr> {
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    raw.trim_start_matches('[').trim_end_matches(']').parse().ok()
}

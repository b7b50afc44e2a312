//! Cross-origin resource sharing headers.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderMap, HeaderName, HeaderValue, VARY,
};
use serde::{Deserialize, Serialize};

const DEFAULT_HEADERS: &str = "Accept, Content-Type, Content-Length, Cache-Control, Pragma, Accept-Encoding, X-CSRF-Token, Authorization, X-Auth-Cookie";
const DEFAULT_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, LINK, HEAD";

/// The router's CORS policy.
///
/// Defaults: enabled, credentials allowed, every origin echoed back.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Cors {
    pub enabled: bool,
    pub allow_credentials: bool,
    /// Echo the request's `Origin` instead of sending `allow_origin`.
    pub allow_origin_all: bool,
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_credentials: true,
            allow_origin_all: true,
            allow_origin: String::new(),
            allow_methods: DEFAULT_METHODS.to_owned(),
            allow_headers: DEFAULT_HEADERS.to_owned(),
        }
    }
}

impl Cors {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Always answers with `origin`, whatever the request sent.
    pub fn fixed_origin(origin: impl Into<String>) -> Self {
        Self { allow_origin_all: false, allow_origin: origin.into(), ..Self::default() }
    }

    /// Headers for a request carrying `origin`. Empty when disabled.
    ///
    /// In echo mode a request without `Origin` gets only `Vary: Origin`.
    pub fn headers(&self, origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.enabled {
            return headers;
        }

        if self.allow_origin_all {
            if let Some(origin) = origin {
                set(&mut headers, ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            headers.insert(VARY, HeaderValue::from_static("Origin"));
        } else {
            set(&mut headers, ACCESS_CONTROL_ALLOW_ORIGIN, &self.allow_origin);
        }

        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        set(&mut headers, ACCESS_CONTROL_ALLOW_METHODS, &self.allow_methods);
        set(&mut headers, ACCESS_CONTROL_ALLOW_HEADERS, &self.allow_headers);
        headers
    }
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "skipping CORS header with invalid value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_mode_reflects_origin_and_varies() {
        let headers = Cors::default().headers(Some("https://example.com"));
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
        assert_eq!(headers[VARY], "Origin");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], DEFAULT_METHODS);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], DEFAULT_HEADERS);
    }

    #[test]
    fn fixed_origin_ignores_request_origin() {
        let cors = Cors::fixed_origin("https://fixed.example");
        for origin in [Some("https://other.example"), None] {
            let headers = cors.headers(origin);
            assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://fixed.example");
            assert!(!headers.contains_key(VARY));
        }
    }

    #[test]
    fn disabled_sets_nothing() {
        assert!(Cors::disabled().headers(Some("https://example.com")).is_empty());
    }

    #[test]
    fn credentials_header_is_optional() {
        let cors = Cors { allow_credentials: false, ..Cors::default() };
        assert!(!cors.headers(None).contains_key(ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }
}

//! HTTP basic authentication (RFC 7617).

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::handler::{BoxedHandler, boxed};
use crate::request::Request;
use crate::response::Response;

const CHALLENGE: &str = "Basic realm=Restricted";

/// Required credentials.
#[derive(Clone, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into() }
    }

    /// Plain equality on both parts; not constant-time.
    fn accepts(&self, header: Option<&str>) -> bool {
        match header.and_then(decode) {
            Some((user, password)) => user == self.user && password == self.password,
            None => false,
        }
    }
}

/// Splits an `Authorization: Basic <base64(user:password)>` value.
fn decode(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

/// Middleware that only lets requests with matching credentials through.
///
/// Anything else gets `401`, a `WWW-Authenticate: Basic realm=Restricted`
/// challenge and `error` as the JSON body; the wrapped handler is not called.
pub fn basic_auth(
    credentials: BasicAuth,
    error: serde_json::Value,
) -> impl Fn(BoxedHandler) -> BoxedHandler + Clone + Send + Sync + 'static {
    let credentials = Arc::new(credentials);
    let error = Arc::new(error);

    move |next: BoxedHandler| {
        let credentials = Arc::clone(&credentials);
        let error = Arc::clone(&error);
        boxed(move |req: Request| {
            let next = Arc::clone(&next);
            let credentials = Arc::clone(&credentials);
            let error = Arc::clone(&error);
            async move {
                let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
                if credentials.accepts(header) {
                    return next.call(req).await;
                }
                tracing::debug!(path = %req.path(), "basic auth rejected");
                let mut res = Response::respond(StatusCode::UNAUTHORIZED, &*error);
                res.headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
                res
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/persons");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        Request::new(builder.body(Bytes::new()).expect("valid request"), None)
    }

    fn encoded(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    fn guarded(calls: Arc<AtomicUsize>) -> BoxedHandler {
        let middleware = basic_auth(BasicAuth::new("admin", "pa:ss"), serde_json::json!("nope"));
        middleware(boxed(move |_: Request| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Response::text("ok")
            }
        }))
    }

    #[tokio::test]
    async fn correct_credentials_call_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = guarded(Arc::clone(&calls)).call(request(Some(&encoded("admin", "pa:ss")))).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_or_missing_credentials_are_challenged() {
        for header in [None, Some(encoded("admin", "wrong")), Some("Bearer abc".to_owned())] {
            let calls = Arc::new(AtomicUsize::new(0));
            let res = guarded(Arc::clone(&calls)).call(request(header.as_deref())).await;

            assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(res.header("www-authenticate"), Some(CHALLENGE));
            assert_eq!(res.body(), br#""nope""#);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn decode_splits_on_first_colon() {
        assert_eq!(
            decode(&encoded("u", "a:b")),
            Some(("u".to_owned(), "a:b".to_owned()))
        );
        assert_eq!(decode("basic !!!"), None);
    }
}

//! Cache suppression.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};

use crate::handler::{BoxedHandler, boxed};
use crate::request::Request;

const ETAG_HEADERS: [&str; 6] = [
    "etag",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-range",
    "if-unmodified-since",
];

const NO_CACHE_HEADERS: [(&str, &str); 4] = [
    ("cache-control", "no-cache, no-store, no-transform, must-revalidate, private, max-age=0"),
    ("expires", "Thu, 01 Jan 1970 00:00:00 UTC"),
    ("pragma", "no-cache"),
    ("x-accel-expires", "0"),
];

/// Drops conditional request headers so the handler always produces a full
/// response, then marks that response uncacheable for proxies and clients.
pub fn no_cache(next: BoxedHandler) -> BoxedHandler {
    boxed(move |mut req: Request| {
        let next = Arc::clone(&next);
        async move {
            for name in ETAG_HEADERS {
                req.headers_mut().remove(name);
            }
            let mut res = next.call(req).await;
            for (name, value) in NO_CACHE_HEADERS {
                res.headers_mut()
                    .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
            }
            res
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;
    use bytes::Bytes;

    #[tokio::test]
    async fn strips_conditionals_and_sets_headers() {
        let handler = no_cache(boxed(|req: Request| async move {
            let saw_conditional = req.header("if-none-match").is_some();
            Response::text(saw_conditional.to_string())
        }));

        let req = http::Request::builder()
            .header("if-none-match", "\"abc\"")
            .header("accept", "application/json")
            .body(Bytes::new())
            .expect("valid request");
        let res = handler.call(Request::new(req, None)).await;

        assert_eq!(res.body(), b"false");
        assert_eq!(res.header("pragma"), Some("no-cache"));
        assert_eq!(res.header("x-accel-expires"), Some("0"));
        assert_eq!(res.header("expires"), Some("Thu, 01 Jan 1970 00:00:00 UTC"));
        assert!(res.header("cache-control").is_some_and(|v| v.contains("no-store")));
    }
}

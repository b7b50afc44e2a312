//! Client-facing API errors.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::writer::ResponseWriter;

/// Error code for failures that have no HTTP equivalent.
pub const ERR_CODE_UNKNOWN: u16 = 600;

/// An error returned to the client as JSON.
///
/// The public `message` is what the client sees; `internal_message` is only
/// ever logged. Building one logs the internal message at a level derived from
/// the code (see [`ApiError::from_request`]).
///
/// ```json
/// {"code":422,"data":null,"ip_address":"1.2.3.4","method":"POST",
///  "message":"email is required","request_guid":"…","url":"/persons"}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub data: serde_json::Value,
    #[serde(skip)]
    pub internal_message: String,
    pub ip_address: String,
    pub method: String,
    #[serde(rename = "message")]
    pub public_message: String,
    pub request_guid: String,
    pub url: String,
}

impl ApiError {
    /// Builds the error from the request's context.
    ///
    /// Logging: codes below 400 and 404 are not logged; 400 and anything
    /// above 422 log at `error`; the rest at `warn`.
    pub fn from_request(
        req: &Request,
        internal_message: impl Into<String>,
        public_message: impl Into<String>,
        code: u16,
        data: serde_json::Value,
    ) -> Self {
        let err = Self {
            code,
            data,
            internal_message: internal_message.into(),
            ip_address: req.client_ip().to_owned(),
            method: req.method().to_string(),
            public_message: public_message.into(),
            request_guid: req.request_id().to_owned(),
            url: req.uri().to_string(),
        };
        err.log();
        err
    }

    /// Same as [`from_request`](Self::from_request), for handlers writing
    /// through a [`ResponseWriter`].
    pub fn from_writer(
        w: &ResponseWriter,
        internal_message: impl Into<String>,
        public_message: impl Into<String>,
        code: u16,
        data: serde_json::Value,
    ) -> Self {
        let err = Self {
            code,
            data,
            internal_message: internal_message.into(),
            ip_address: w.ip_address().to_owned(),
            method: w.method().to_string(),
            public_message: public_message.into(),
            request_guid: w.request_id().to_owned(),
            url: w.url().to_owned(),
        };
        err.log();
        err
    }

    pub fn code(&self) -> u16 { self.code }
    pub fn internal(&self) -> &str { &self.internal_message }

    /// The public JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn log(&self) {
        let code = self.code;
        if code < 400 || code == 404 {
            return;
        }
        if code == 400 || code > 422 {
            tracing::error!(code, request_id = %self.request_guid, "internal error message: {}", self.internal_message);
        } else {
            tracing::warn!(code, request_id = %self.request_guid, "internal error message: {}", self.internal_message);
        }
    }
}

/// Only the public message.
impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.public_message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Response::respond(status, &self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request() -> Request {
        let req = http::Request::builder()
            .method("DELETE")
            .uri("/persons?id=3")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Bytes::new())
            .expect("valid request");
        Request::new(req, None)
    }

    #[test]
    fn internal_message_never_serialized() {
        let req = request();
        let err = ApiError::from_request(&req, "db password rejected", "could not delete", 417, serde_json::Value::Null);
        let json: serde_json::Value = serde_json::from_str(&err.to_json().expect("serializes")).expect("json");

        assert_eq!(json["code"], 417);
        assert_eq!(json["message"], "could not delete");
        assert_eq!(json["ip_address"], "1.2.3.4");
        assert_eq!(json["method"], "DELETE");
        assert_eq!(json["url"], "/persons?id=3");
        assert_eq!(json["request_guid"], req.request_id());
        assert!(!err.to_json().expect("serializes").contains("db password"));
        assert_eq!(err.to_string(), "could not delete");
        assert_eq!(err.internal(), "db password rejected");
    }

    #[test]
    fn response_uses_code_as_status() {
        let err = ApiError::from_request(&request(), "", "missing", 400, serde_json::json!({"field": "email"}));
        let res = err.into_response();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(res.body()).expect("json");
        assert_eq!(json["data"]["field"], "email");
    }

    #[test]
    fn invalid_code_becomes_server_error() {
        let err = ApiError::from_request(&request(), "", "odd", 42, serde_json::Value::Null);
        assert_eq!(err.into_response().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! The per-request pipeline every route runs through.
//!
//! 1. parse parameters into the request,
//! 2. resolve the client IP and a correlation ID,
//! 3. compute CORS headers,
//! 4. log "request started" (unless quiet or skip-listed),
//! 5. run the handler inside a `request` span,
//! 6. add the CORS headers the handler did not set itself (`Vary` is unioned),
//! 7. log "request completed" with the elapsed milliseconds and status.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::handler::BoxedHandler;
use crate::middleware::Cors;
use crate::params::ParamConfig;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Clone, Default)]
pub(crate) struct Pipeline {
    pub(crate) cors: Cors,
    pub(crate) skip_logging_paths: Vec<String>,
    pub(crate) params: Arc<ParamConfig>,
}

impl Pipeline {
    pub(crate) async fn process(&self, mut req: Request, handler: BoxedHandler, logged: bool) -> Response {
        req.parse_params(Arc::clone(&self.params)).await;

        let request_id = req.request_id().to_owned();
        let ip_address = req.client_ip().to_owned();
        let cors = self.cors.headers(req.header("origin"));

        let logged = logged && !self.skip_logging_paths.iter().any(|p| p == req.path());
        if !logged {
            let mut res = handler.call(req).await;
            res.merge_missing_headers(cors);
            return res;
        }

        let method = req.method().clone();
        let path = req.path().to_owned();
        let user_agent = req.user_agent().to_owned();
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            ip_address = %ip_address,
            user_agent = %user_agent,
            params = %req.params().filtered(),
            "request started"
        );

        let start = Instant::now();
        let mut res = handler
            .call(req)
            .instrument(info_span!("request", request_id = %request_id))
            .await;
        res.merge_missing_headers(cors);

        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            ip_address = %ip_address,
            user_agent = %user_agent,
            service_ms = start.elapsed().as_millis() as u64,
            status = res.status_code().as_u16(),
            "request completed"
        );
        res
    }
}

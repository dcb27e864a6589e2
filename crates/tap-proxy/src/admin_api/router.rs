//! Route dispatch for the management endpoint.

use super::handlers;
use super::types::{error_response, method_not_allowed};
use crate::proxy::BoxError;
use crate::rules::RuleStore;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;

/// Main request router
pub async fn route_request<B>(rules: &RuleStore, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Management API: {} {}", method, path);

    match (method, path.as_str()) {
        (Method::GET, "/metrics") => handlers::handle_metrics(),
        (Method::GET, _) => handlers::handle_list(rules),
        (Method::POST, _) => match req.into_body().collect().await {
            Ok(collected) => handlers::handle_upsert(rules, &collected.to_bytes()),
            Err(e) => {
                let e: BoxError = e.into();
                error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to read request body: {e}"),
                )
            }
        },
        _ => method_not_allowed(),
    }
}

//! Per-request pipeline: classify, sanitize, reconstruct, dispatch, respond.

use super::context::{ConnInfo, Exchange, ProxyState};
use super::error::{BoxError, ForwardError};
use super::forwarding::{
    build_target, dispatch, respond_buffered, respond_streaming, response_mode, ResponseMode,
};
use super::headers::sanitize_request_headers;
use super::response_ext::{ProxyBody, ResponseExt};
use crate::admin_api;
use crate::metrics;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::HOST;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use tracing::{debug, warn};

/// Host the client addressed, from the Host header or an absolute-form URI.
pub fn request_host<B>(req: &Request<B>) -> String {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Metric label for a request method; client-chosen extension methods share one label.
fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        _ => "OTHER",
    }
}

/// Handle one inbound request. Errors become plain-text responses.
pub async fn handle_request<B>(
    state: &ProxyState,
    conn: &ConnInfo,
    req: Request<B>,
) -> Result<Response<ProxyBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let host = request_host(&req);
    if state.local_addrs.is_local_host(&host) {
        debug!("Management request {} {} from {}", req.method(), req.uri(), conn.remote_addr);
        return Ok(admin_api::route_request(&state.rules, req).await.into_boxed());
    }

    let method = req.method().clone();
    match forward(state, conn, host, req).await {
        Ok((mode, response)) => {
            metrics::record_request(method_label(&method), mode.as_str(), response.status().as_u16());
            Ok(response)
        }
        Err(e) => {
            let mode = match e {
                ForwardError::UnsupportedMethod(_) => "rejected",
                _ => "error",
            };
            warn!("{} request from {} failed: {}", method, conn.remote_addr, e);
            let response = e.to_response();
            metrics::record_request(method_label(&method), mode, response.status().as_u16());
            Ok(response)
        }
    }
}

async fn forward<B>(
    state: &ProxyState,
    conn: &ConnInfo,
    host: String,
    req: Request<B>,
) -> Result<(ResponseMode, Response<ProxyBody>), ForwardError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    if method != Method::GET && method != Method::POST {
        return Err(ForwardError::UnsupportedMethod(method));
    }

    let request_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let target = build_target(conn.scheme(), &host, &request_uri)?;

    let (parts, body) = req.into_parts();
    let request_body = body
        .collect()
        .await
        .map_err(|e| ForwardError::ReadRequestBody(e.into()))?
        .to_bytes();

    let outbound_headers = sanitize_request_headers(&parts.headers);
    let response = dispatch(
        &state.http_client,
        &method,
        target,
        outbound_headers,
        request_body.clone(),
    )
    .await?;

    let exchange = Exchange {
        method,
        request_key: format!("{host}{request_uri}"),
        request_headers: parts.headers,
        request_body,
        remote: conn.remote_addr.ip(),
    };

    let mode = response_mode(&response);
    let client_response = match mode {
        ResponseMode::Buffered => respond_buffered(state, &exchange, response).await?,
        ResponseMode::Streaming => respond_streaming(state, &exchange, response),
    };
    Ok((mode, client_response))
}

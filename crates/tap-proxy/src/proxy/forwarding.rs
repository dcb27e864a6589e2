//! Origin request reconstruction and the two response paths.
//!
//! Textual responses (`text`, `javascript`, `json` content types) are read in
//! full so they can be mirrored or logged with their body. Everything else is
//! relayed as it arrives and is at most logged without a body.

use super::client::HttpClient;
use super::context::{Exchange, ProxyState};
use super::error::ForwardError;
use super::headers::{buffered_response_headers, is_gzip_encoded, streaming_response_headers};
use super::relay::relay_body;
use super::response_ext::{full_body, ProxyBody};
use crate::metrics;
use crate::rules::Disposition;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Request, Response, Uri};
use std::io::Read;
use std::time::Instant;
use tracing::{debug, warn};

/// How an origin response is handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Buffered,
    Streaming,
}

impl ResponseMode {
    /// Chosen from the origin's Content-Type.
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("text") || ct.contains("javascript") || ct.contains("json") => {
                ResponseMode::Buffered
            }
            _ => ResponseMode::Streaming,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Buffered => "buffered",
            ResponseMode::Streaming => "streaming",
        }
    }
}

/// `scheme://host/request-uri`
pub fn build_target(scheme: &str, host: &str, request_uri: &str) -> Result<Uri, ForwardError> {
    let target = format!("{scheme}://{host}{request_uri}");
    if host.is_empty() {
        return Err(ForwardError::InvalidTarget {
            target,
            reason: "missing Host".to_string(),
        });
    }
    target
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidTarget {
            reason: e.to_string(),
            target,
        })
}

/// Send the reconstructed request to the origin. Only GET and POST get here.
pub async fn dispatch(
    http_client: &HttpClient,
    method: &Method,
    target: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Incoming>, ForwardError> {
    debug!("Forwarding {} {}", method, target);

    let body = if method == Method::POST { body } else { Bytes::new() };
    let mut outbound = Request::new(Full::new(body));
    *outbound.method_mut() = method.clone();
    *outbound.uri_mut() = target;
    *outbound.headers_mut() = headers;

    let start = Instant::now();
    let response = http_client
        .request(outbound)
        .await
        .map_err(ForwardError::UpstreamDispatch)?;
    metrics::record_upstream_duration(method.as_str(), start.elapsed().as_secs_f64() * 1000.0);
    Ok(response)
}

pub fn response_mode(response: &Response<Incoming>) -> ResponseMode {
    ResponseMode::for_content_type(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

pub fn decode_gzip(raw: &[u8]) -> Result<Bytes, std::io::Error> {
    let mut decoded = Vec::with_capacity(raw.len() * 2);
    GzDecoder::new(raw).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

/// Read the whole origin body, apply the matching rule and answer with exact length.
pub async fn respond_buffered<B>(
    state: &ProxyState,
    exchange: &Exchange,
    response: Response<B>,
) -> Result<Response<ProxyBody>, ForwardError>
where
    B: hyper::body::Body<Data = Bytes, Error = hyper::Error>,
{
    let (parts, body) = response.into_parts();
    let raw = body
        .collect()
        .await
        .map_err(ForwardError::ReadResponseBody)?
        .to_bytes();

    let decoded = is_gzip_encoded(&parts.headers) && !raw.is_empty();
    let body = if decoded {
        decode_gzip(&raw).map_err(ForwardError::Decode)?
    } else {
        raw
    };
    let mut headers = buffered_response_headers(&parts.headers, decoded);

    let matched = exchange.match_rules(&state.rules);
    let body = match &matched.disposition {
        Disposition::Mirror(collector) => {
            let snapshot = exchange.snapshot(&parts.headers, &body, &matched.group);
            match state.collector.mirror(collector, &snapshot).await {
                Ok(replacement) => {
                    debug!(
                        "Mirror {} replaced body of {} ({} -> {} bytes)",
                        collector,
                        exchange.request_key,
                        body.len(),
                        replacement.len()
                    );
                    replacement
                }
                Err(e) => {
                    warn!(
                        "Mirror failed for {}, forwarding origin body: {}",
                        exchange.request_key, e
                    );
                    body
                }
            }
        }
        Disposition::Log(collector) => {
            let snapshot = exchange.snapshot(&parts.headers, &body, &matched.group);
            state.collector.log(collector, snapshot);
            body
        }
        Disposition::None => body,
    };

    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    let mut client_response = Response::new(full_body(Full::new(body)));
    *client_response.status_mut() = parts.status;
    *client_response.headers_mut() = headers;
    Ok(client_response)
}

/// Relay the origin body as it arrives. Only logging applies here.
pub fn respond_streaming<B>(
    state: &ProxyState,
    exchange: &Exchange,
    response: Response<B>,
) -> Response<ProxyBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<super::error::BoxError> + Send,
{
    let (parts, body) = response.into_parts();

    let matched = exchange.match_rules(&state.rules);
    if let Disposition::Log(collector) = &matched.disposition {
        let snapshot = exchange.snapshot(&parts.headers, &[], &matched.group);
        state.collector.log(collector, snapshot);
    }

    let mut client_response = Response::new(relay_body(
        body,
        state.relay_chunk_size,
        exchange.request_key.clone(),
    ));
    *client_response.status_mut() = parts.status;
    *client_response.headers_mut() = streaming_response_headers(&parts.headers);
    client_response
}

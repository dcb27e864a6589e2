//! Header rewriting between client, origin and collector.
//!
//! Hop-by-hop headers describe a single connection and are never copied
//! across the proxy in either direction.

use hyper::header::{
    HeaderName, HeaderValue, ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use hyper::HeaderMap;

static GZIP: HeaderValue = HeaderValue::from_static("gzip");

/// Connection-scoped headers removed when relaying.
pub static HOP_BY_HOP_HEADERS: [HeaderName; 9] = [
    CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Headers for the outbound origin request.
///
/// An `Accept-Encoding` that mentions gzip collapses to exactly `gzip` so the
/// buffered path only ever sees an encoding it can decode. Host and
/// Content-Length are regenerated by the client.
pub fn sanitize_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();

    let wants_gzip = headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .any(|value| value.to_str().is_ok_and(|v| v.contains("gzip")));
    if wants_gzip {
        headers.insert(ACCEPT_ENCODING, GZIP.clone());
    }

    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers
}

/// True when the origin body is gzip-encoded.
pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Origin headers for a fully buffered response. Content-Length is set by the caller.
pub fn buffered_response_headers(origin: &HeaderMap, decoded: bool) -> HeaderMap {
    let mut headers = origin.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);
    if decoded {
        headers.remove(CONTENT_ENCODING);
    }
    headers
}

/// Origin headers for a streamed response; encoding and length pass through untouched.
pub fn streaming_response_headers(origin: &HeaderMap) -> HeaderMap {
    let mut headers = origin.clone();
    strip_hop_by_hop(&mut headers);
    headers
}

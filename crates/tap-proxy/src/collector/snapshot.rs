//! JSON payload handed to collectors.

use hyper::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// One request/response exchange as seen by the proxy.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub method: String,
    /// `host + request-uri`
    pub uri: String,
    pub request_header: BTreeMap<String, Vec<String>>,
    pub request_body: String,
    pub response_header: BTreeMap<String, Vec<String>>,
    /// Empty for streamed responses
    pub response_body: String,
    pub group: String,
}

/// Multi-valued header map in `name -> [values]` form.
pub fn header_map_to_json(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        out.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

pub fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

//! Shared proxy state and per-request data.

use super::client::{create_http_client, HttpClient};
use super::network::LocalAddrs;
use crate::collector::{body_text, header_map_to_json, CollectorClient, Snapshot};
use crate::config::Config;
use crate::rules::{RuleMatch, RuleStore};
use bytes::Bytes;
use hyper::{HeaderMap, Method};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// State shared by every connection on both listeners.
pub struct ProxyState {
    pub rules: Arc<RuleStore>,
    pub collector: Arc<CollectorClient>,
    pub http_client: HttpClient,
    pub local_addrs: LocalAddrs,
    pub relay_chunk_size: usize,
}

impl ProxyState {
    pub fn new(
        config: &Config,
        rules: Arc<RuleStore>,
        collector: Arc<CollectorClient>,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            rules,
            collector,
            http_client: create_http_client(config)?,
            local_addrs: LocalAddrs::discover(),
            relay_chunk_size: config.relay_chunk_size,
        })
    }

    /// Replace the detected interface addresses.
    pub fn with_local_addrs(mut self, local_addrs: LocalAddrs) -> Self {
        self.local_addrs = local_addrs;
        self
    }
}

/// Facts about the inbound connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ConnInfo {
    pub remote_addr: SocketAddr,
    pub tls: bool,
}

impl ConnInfo {
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }
}

/// The inbound half of one proxied exchange.
pub struct Exchange {
    pub method: Method,
    /// `host + request-uri`, the string rules are matched against
    pub request_key: String,
    pub request_headers: HeaderMap,
    pub request_body: Bytes,
    pub remote: IpAddr,
}

impl Exchange {
    pub fn match_rules(&self, rules: &RuleStore) -> RuleMatch {
        rules.match_request(&self.request_key, self.remote)
    }

    pub fn snapshot(&self, response_headers: &HeaderMap, response_body: &[u8], group: &str) -> Snapshot {
        Snapshot {
            method: self.method.to_string(),
            uri: self.request_key.clone(),
            request_header: header_map_to_json(&self.request_headers),
            request_body: body_text(&self.request_body),
            response_header: header_map_to_json(response_headers),
            response_body: body_text(response_body),
            group: group.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};

    #[test]
    fn test_snapshot_from_exchange() {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let exchange = Exchange {
            method: Method::POST,
            request_key: "api.example.com/v1/orders?page=2".into(),
            request_headers,
            request_body: Bytes::from_static(b"{\"id\":7}"),
            remote: "192.0.2.10".parse().unwrap(),
        };

        let mut response_headers = HeaderMap::new();
        response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let snapshot = exchange.snapshot(&response_headers, b"{\"ok\":true}", "orders");

        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.uri, "api.example.com/v1/orders?page=2");
        assert_eq!(snapshot.request_header["user-agent"], vec!["curl/8.0"]);
        assert_eq!(snapshot.request_body, "{\"id\":7}");
        assert_eq!(snapshot.response_header["content-type"], vec!["application/json"]);
        assert_eq!(snapshot.response_body, "{\"ok\":true}");
        assert_eq!(snapshot.group, "orders");
    }

    #[test]
    fn test_scheme_follows_tls() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(ConnInfo { remote_addr: addr, tls: true }.scheme(), "https");
        assert_eq!(ConnInfo { remote_addr: addr, tls: false }.scheme(), "http");
    }
}

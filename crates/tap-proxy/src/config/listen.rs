//! Listener and certificate configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Plain HTTP listener
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// TLS listener; certificates are provisioned per SNI name
    #[serde(default = "default_https_addr")]
    pub https_addr: String,
}

fn default_http_addr() -> String {
    "0.0.0.0:80".to_string()
}

fn default_https_addr() -> String {
    "0.0.0.0:443".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            https_addr: default_https_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertificateConfig {
    /// Refetch a cached certificate once it is older than this.
    /// Unset means certificates live for the whole process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

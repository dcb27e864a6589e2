//! Configuration types for tap-proxy.

mod collector;
mod listen;
mod upstream;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use collector::CollectorConfig;
pub use listen::{CertificateConfig, ListenConfig};
pub use upstream::ConnectionPoolConfig;

pub const DEFAULT_CA_SERVER: &str = "http://gca";
pub const DEFAULT_INIT_RULES: &str = "init_rules.json";
pub const DEFAULT_RELAY_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Base URL of the signing service (`GET {ca_server}/sign/{domain}`)
    #[serde(default = "default_ca_server")]
    pub ca_server: String,

    /// Rule file applied at startup; ignored when missing
    #[serde(default = "default_init_rules")]
    pub init_rules: PathBuf,

    #[serde(default)]
    pub certificates: CertificateConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Skip origin certificate verification (development/testing only)
    #[serde(default)]
    pub upstream_tls_skip_verify: bool,

    /// Largest chunk written to the client while streaming a response
    #[serde(default = "default_relay_chunk_size")]
    pub relay_chunk_size: usize,
}

fn default_ca_server() -> String {
    DEFAULT_CA_SERVER.to_string()
}

fn default_init_rules() -> PathBuf {
    PathBuf::from(DEFAULT_INIT_RULES)
}

fn default_relay_chunk_size() -> usize {
    DEFAULT_RELAY_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            ca_server: default_ca_server(),
            init_rules: default_init_rules(),
            certificates: CertificateConfig::default(),
            collector: CollectorConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            upstream_tls_skip_verify: false,
            relay_chunk_size: default_relay_chunk_size(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen
            .http_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid listen.http_addr '{}': {e}", self.listen.http_addr))?;
        self.listen
            .https_addr
            .parse::<SocketAddr>()
            .map_err(|e| {
                anyhow::anyhow!("Invalid listen.https_addr '{}': {e}", self.listen.https_addr)
            })?;

        if !(self.ca_server.starts_with("http://") || self.ca_server.starts_with("https://")) {
            anyhow::bail!(
                "ca_server must be an http(s) URL, got '{}'",
                self.ca_server
            );
        }

        if self.relay_chunk_size == 0 {
            anyhow::bail!("relay_chunk_size must be greater than zero");
        }

        if self.collector.log_queue_size == 0 {
            anyhow::bail!("collector.log_queue_size must be greater than zero");
        }

        if self.certificates.ttl_secs == Some(0) {
            anyhow::bail!("certificates.ttl_secs must be greater than zero when set");
        }

        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listen.http_addr.parse()?)
    }

    pub fn https_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listen.https_addr.parse()?)
    }
}

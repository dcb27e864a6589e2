//! tap-proxy: SNI-aware TLS-terminating reverse proxy.
//!
//! Usage:
//!   tap-proxy [--config tap.yaml] [--ca-server http://gca] [--init-rules init_rules.json]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tap_proxy::certs::{CertProvisioner, HttpCertificateAuthority};
use tap_proxy::collector::CollectorClient;
use tap_proxy::config::Config;
use tap_proxy::proxy::{ProxyServer, ProxyState};
use tap_proxy::rules::{load_rules_file, RuleStore};
use tracing::{info, warn};

/// Signing service calls give up after this long
const CA_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "tap-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TAP_CONFIG")]
    config: Option<PathBuf>,

    /// Plain HTTP listen address (overrides the config file)
    #[arg(long)]
    http_addr: Option<String>,

    /// TLS listen address (overrides the config file)
    #[arg(long)]
    https_addr: Option<String>,

    /// Base URL of the certificate signing service
    #[arg(long, env = "CA_SERVER")]
    ca_server: Option<String>,

    /// Rule file applied at startup
    #[arg(long, env = "INIT_RULES")]
    init_rules: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<Config, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(addr) = self.http_addr {
            config.listen.http_addr = addr;
        }
        if let Some(addr) = self.https_addr {
            config.listen.https_addr = addr;
        }
        if let Some(ca_server) = self.ca_server {
            config.ca_server = ca_server;
        }
        if let Some(init_rules) = self.init_rules {
            config.init_rules = init_rules;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Process-wide default for any TLS user that does not pick a provider itself
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Args::parse().into_config()?;
    info!(
        "Starting tap-proxy (ca_server={}, init_rules={})",
        config.ca_server,
        config.init_rules.display()
    );

    let rules = Arc::new(RuleStore::new());
    if let Err(e) = load_rules_file(&rules, &config.init_rules) {
        warn!("Ignoring startup rules: {:#}", e);
    }

    let authority = HttpCertificateAuthority::new(&config.ca_server, CA_REQUEST_TIMEOUT)?;
    let provisioner = Arc::new(
        CertProvisioner::new(Arc::new(authority))
            .with_ttl(config.certificates.ttl_secs.map(Duration::from_secs)),
    );

    let collector = Arc::new(CollectorClient::new(&config.collector)?);
    let state = ProxyState::new(&config, rules, collector)?;

    ProxyServer::new(state, provisioner)
        .run(config.http_addr()?, config.https_addr()?)
        .await
}

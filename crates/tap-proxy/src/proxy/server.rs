//! Listener loops for the plain and TLS ports.

use super::context::{ConnInfo, ProxyState};
use super::handler::handle_request;
use super::network::create_reusable_listener;
use super::tls::server_config;
use crate::certs::CertProvisioner;
use hyper::rt::{Read, Write};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rustls::server::Acceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::LazyConfigAcceptor;
use tracing::{debug, error, info, warn};

/// Back-off after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// The proxy's two listeners sharing one state.
pub struct ProxyServer {
    state: Arc<ProxyState>,
    provisioner: Arc<CertProvisioner>,
}

impl ProxyServer {
    pub fn new(state: ProxyState, provisioner: Arc<CertProvisioner>) -> Self {
        Self {
            state: Arc::new(state),
            provisioner,
        }
    }

    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// Bind both listeners and serve until one of them fails.
    pub async fn run(self, http_addr: SocketAddr, https_addr: SocketAddr) -> Result<(), anyhow::Error> {
        let http_listener = create_reusable_listener(http_addr)
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener on {http_addr}: {e}"))?;
        let https_listener = create_reusable_listener(https_addr)
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTPS listener on {https_addr}: {e}"))?;

        info!("Listening on http://{}", http_addr);
        info!("Listening on https://{}", https_addr);
        info!("Serving {} output rules", self.state.rules.len());

        let server = Arc::new(self);
        tokio::try_join!(
            Arc::clone(&server).serve_http(http_listener),
            server.serve_https(https_listener),
        )?;
        Ok(())
    }

    /// Accept plain HTTP connections.
    pub async fn serve_http(self: Arc<Self>, listener: TcpListener) -> Result<(), anyhow::Error> {
        loop {
            let Some((stream, remote_addr)) = accept(&listener).await else {
                continue;
            };
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let conn = ConnInfo {
                    remote_addr,
                    tls: false,
                };
                server.serve_connection(TokioIo::new(stream), conn).await;
            });
        }
    }

    /// Accept TLS connections, provisioning a certificate from each ClientHello's SNI.
    pub async fn serve_https(self: Arc<Self>, listener: TcpListener) -> Result<(), anyhow::Error> {
        loop {
            let Some((stream, remote_addr)) = accept(&listener).await else {
                continue;
            };
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.serve_tls_connection(stream, remote_addr).await;
            });
        }
    }

    async fn serve_tls_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        let start = match LazyConfigAcceptor::new(Acceptor::default(), stream).await {
            Ok(start) => start,
            Err(e) => {
                debug!("Failed to read ClientHello from {}: {}", remote_addr, e);
                return;
            }
        };

        let server_name = start
            .client_hello()
            .server_name()
            .unwrap_or_default()
            .to_string();
        let key = match self.provisioner.provision(&server_name).await {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    "TLS handshake from {} aborted, no certificate for '{}': {}",
                    remote_addr, server_name, e
                );
                return;
            }
        };
        let config = match server_config(key) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to build TLS configuration for '{}': {}", server_name, e);
                return;
            }
        };

        match start.into_stream(config).await {
            Ok(tls_stream) => {
                let conn = ConnInfo {
                    remote_addr,
                    tls: true,
                };
                self.serve_connection(TokioIo::new(tls_stream), conn).await;
            }
            Err(e) => {
                debug!("TLS handshake failed from {}: {}", remote_addr, e);
            }
        }
    }

    async fn serve_connection<I>(self: Arc<Self>, io: I, conn: ConnInfo)
    where
        I: Read + Write + Unpin + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let service = service_fn(move |req| {
            let state = Arc::clone(&state);
            async move { handle_request(&state, &conn, req).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            debug!(
                "Error serving {} connection from {}: {}",
                conn.scheme(),
                conn.remote_addr,
                err
            );
        }
    }
}

async fn accept(listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
    match listener.accept().await {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            error!("Failed to accept connection: {}", e);
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

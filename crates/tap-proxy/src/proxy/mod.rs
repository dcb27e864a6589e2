//! The forwarding proxy.
//!
//! # Module Structure
//!
//! - `server` - the HTTP and TLS listener loops
//! - `handler` - per-request pipeline and management classification
//! - `forwarding` - origin request reconstruction, buffered and streaming responses
//! - `relay` - chunked relay of streamed bodies
//! - `headers` - hop-by-hop stripping and header rewriting
//! - `client` - pooled origin client
//! - `tls` - per-handshake server configuration
//! - `network` - listener sockets (SO_REUSEPORT) and local interface detection

mod client;
mod context;
mod error;
mod forwarding;
mod handler;
mod headers;
mod network;
mod relay;
mod response_ext;
mod server;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use context::{ConnInfo, Exchange, ProxyState};
pub use error::{BoxError, ForwardError};
pub use forwarding::ResponseMode;
pub use handler::handle_request;
pub use headers::HOP_BY_HOP_HEADERS;
pub use network::{create_reusable_listener, LocalAddrs};
pub use response_ext::{text_response, ProxyBody, ResponseExt};
pub use server::ProxyServer;
pub use tls::server_config;

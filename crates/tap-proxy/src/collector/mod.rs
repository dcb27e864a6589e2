//! Delivery of exchange snapshots to collector services.
//!
//! - `snapshot` - the JSON payload
//! - `client` - synchronous mirror calls (`/chan`)
//! - `dispatcher` - bounded background log delivery (`/log`)

mod client;
mod dispatcher;
mod snapshot;

pub use client::{collector_url, CollectorClient, LOG_ENDPOINT, MIRROR_ENDPOINT};
pub use dispatcher::LogDispatcher;
pub use snapshot::{body_text, header_map_to_json, Snapshot};

use std::time::Duration;

/// A failed collector call. Never fails the client's request.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("collector {url} did not answer within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("collector {url} returned status {status}")]
    Status { url: String, status: u16 },
}

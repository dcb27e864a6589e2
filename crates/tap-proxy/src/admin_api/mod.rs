//! Management endpoint for the output rule table.
//!
//! Reached through the proxy listeners whenever the Host header names one of
//! this machine's interface addresses:
//! - `GET /metrics` - Prometheus exposition
//! - `GET <path>` - current rules as a JSON array
//! - `POST <path>` - upsert one rule

mod handlers;
mod router;
mod types;

pub use router::route_request;

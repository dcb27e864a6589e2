// Library exports for the binary and integration tests

pub mod admin_api;
pub mod certs;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod proxy;
pub mod rules;

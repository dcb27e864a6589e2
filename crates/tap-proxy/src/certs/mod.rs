//! On-demand TLS certificates keyed by SNI name.
//!
//! - `domain` - SNI canonicalization (cache key)
//! - `authority` - the external signing service
//! - `pem` - PEM parsing into rustls signing identities
//! - `provisioner` - per-domain cache with single-flight fetches

mod authority;
mod domain;
mod pem;
mod provisioner;

pub use authority::{CertificateAuthority, HttpCertificateAuthority, SignedPair};
pub use domain::{canonical_domain, FALLBACK_DOMAIN};
pub use pem::parse_certified_key;
pub use provisioner::CertProvisioner;

/// Failure to obtain a certificate. Fatal to one handshake only.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("signing request for {domain} failed: {source}")]
    Transport {
        domain: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("signing service returned status {status} for {domain}")]
    Status { domain: String, status: u16 },
    #[error("signing response for {domain} could not be decoded: {source}")]
    Decode {
        domain: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid PEM material: {0}")]
    Pem(#[source] std::io::Error),
    #[error("no certificate found in PEM material")]
    NoCertificate,
    #[error("no private key found in PEM material")]
    NoPrivateKey,
    #[error("unsupported private key: {0}")]
    Key(#[source] rustls::Error),
}

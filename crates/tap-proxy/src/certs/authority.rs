//! Client for the external signing service.

use super::ProvisionError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// PEM material returned by the signing service.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedPair {
    pub cert: String,
    pub key: String,
}

/// Source of per-domain certificates.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn sign(&self, domain: &str) -> Result<SignedPair, ProvisionError>;
}

/// Signing service reached over HTTP: `GET {base_url}/sign/{domain}`.
pub struct HttpCertificateAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCertificateAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn sign_url(&self, domain: &str) -> String {
        format!("{}/sign/{}", self.base_url, domain)
    }
}

#[async_trait]
impl CertificateAuthority for HttpCertificateAuthority {
    async fn sign(&self, domain: &str) -> Result<SignedPair, ProvisionError> {
        let url = self.sign_url(domain);
        debug!("Requesting certificate from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProvisionError::Transport {
                domain: domain.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ProvisionError::Status {
                domain: domain.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<SignedPair>()
            .await
            .map_err(|source| ProvisionError::Decode {
                domain: domain.to_string(),
                source,
            })
    }
}

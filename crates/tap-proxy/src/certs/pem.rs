//! PEM certificate/key parsing into a rustls signing identity.

use super::ProvisionError;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use std::sync::Arc;

/// Parse a PEM certificate chain and private key into a [`CertifiedKey`].
pub fn parse_certified_key(cert_pem: &str, key_pem: &str) -> Result<Arc<CertifiedKey>, ProvisionError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(ProvisionError::Pem)?;

    if certs.is_empty() {
        return Err(ProvisionError::NoCertificate);
    }

    // PKCS8, RSA or SEC1 keys are all accepted
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(ProvisionError::Pem)?
        .ok_or(ProvisionError::NoPrivateKey)?;

    let signing_key =
        rustls::crypto::ring::sign::any_supported_type(&key).map_err(ProvisionError::Key)?;

    Ok(Arc::new(CertifiedKey::new(certs, signing_key)))
}

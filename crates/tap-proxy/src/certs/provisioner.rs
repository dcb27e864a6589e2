//! Per-domain certificate cache.
//!
//! Each canonical domain owns a `OnceCell` slot. The map lock is only held to
//! find or create a slot; the signing call runs while holding nothing but the
//! slot's own initialization lock, so handshakes for different domains never
//! wait on each other and concurrent handshakes for the same domain share a
//! single fetch. A failed fetch leaves the slot empty and the next handshake
//! retries.

use super::authority::CertificateAuthority;
use super::domain::canonical_domain;
use super::pem::parse_certified_key;
use super::ProvisionError;
use crate::metrics;
use parking_lot::Mutex;
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

struct CachedCert {
    key: Arc<CertifiedKey>,
    fetched_at: Instant,
}

type Slot = Arc<OnceCell<CachedCert>>;

pub struct CertProvisioner {
    authority: Arc<dyn CertificateAuthority>,
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Option<Duration>,
}

impl CertProvisioner {
    pub fn new(authority: Arc<dyn CertificateAuthority>) -> Self {
        Self {
            authority,
            slots: Mutex::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Refetch certificates older than `ttl`.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return the certificate for `server_name`, fetching it on first use.
    pub async fn provision(&self, server_name: &str) -> Result<Arc<CertifiedKey>, ProvisionError> {
        let domain = canonical_domain(server_name);

        let slot = self.slot(&domain);
        let cached = slot.get_or_try_init(|| self.fetch(&domain)).await?;

        match self.ttl {
            Some(ttl) if cached.fetched_at.elapsed() >= ttl => {
                debug!("Certificate for {} is older than {:?}, refreshing", domain, ttl);
                self.evict(&domain, &slot);
                let fresh = self.slot(&domain);
                let refreshed = fresh.get_or_try_init(|| self.fetch(&domain)).await?;
                Ok(Arc::clone(&refreshed.key))
            }
            _ => Ok(Arc::clone(&cached.key)),
        }
    }

    /// Number of domains with a cached certificate.
    pub fn cached_domains(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn slot(&self, domain: &str) -> Slot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(domain.to_string()).or_default())
    }

    /// Drop `stale` from the map unless another task already replaced it.
    fn evict(&self, domain: &str, stale: &Slot) {
        let mut slots = self.slots.lock();
        if slots.get(domain).is_some_and(|current| Arc::ptr_eq(current, stale)) {
            slots.remove(domain);
        }
    }

    async fn fetch(&self, domain: &str) -> Result<CachedCert, ProvisionError> {
        let result = match self.authority.sign(domain).await {
            Ok(pair) => parse_certified_key(&pair.cert, &pair.key),
            Err(e) => Err(e),
        };

        metrics::record_certificate_fetch(result.is_ok());
        match result {
            Ok(key) => {
                info!("Provisioned certificate for {}", domain);
                Ok(CachedCert {
                    key,
                    fetched_at: Instant::now(),
                })
            }
            Err(e) => {
                warn!("Failed to provision certificate for {}: {}", domain, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::authority::SignedPair;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeAuthority {
        calls: AtomicUsize,
        domains: Mutex<Vec<String>>,
        fail: AtomicBool,
        delay: Duration,
    }

    impl FakeAuthority {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                domains: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CertificateAuthority for FakeAuthority {
        async fn sign(&self, domain: &str) -> Result<SignedPair, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.domains.lock().push(domain.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProvisionError::Status {
                    domain: domain.to_string(),
                    status: 503,
                });
            }
            let key = rcgen::KeyPair::generate().unwrap();
            let params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
            let cert = params.self_signed(&key).unwrap();
            Ok(SignedPair {
                cert: cert.pem(),
                key: key.serialize_pem(),
            })
        }
    }

    #[tokio::test]
    async fn test_sibling_subdomains_share_certificate() {
        let authority = Arc::new(FakeAuthority::new());
        let provisioner = CertProvisioner::new(authority.clone());

        let first = provisioner.provision("a.b.example.com").await.unwrap();
        let second = provisioner.provision("c.b.example.com").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(authority.calls(), 1);
        assert_eq!(*authority.domains.lock(), vec!["b.example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_two_label_name_is_its_own_domain() {
        let authority = Arc::new(FakeAuthority::new());
        let provisioner = CertProvisioner::new(authority.clone());

        provisioner.provision("example.com").await.unwrap();
        provisioner.provision("www.example.com").await.unwrap();

        // www.example.com canonicalizes to example.com
        assert_eq!(authority.calls(), 1);
        assert_eq!(*authority.domains.lock(), vec!["example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_sni_uses_fallback_domain() {
        let authority = Arc::new(FakeAuthority::new());
        let provisioner = CertProvisioner::new(authority.clone());

        provisioner.provision("").await.unwrap();
        assert_eq!(*authority.domains.lock(), vec!["127.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let authority = Arc::new(FakeAuthority::new());
        authority.fail.store(true, Ordering::SeqCst);
        let provisioner = CertProvisioner::new(authority.clone());

        let err = provisioner.provision("api.example.org").await;
        assert!(matches!(err, Err(ProvisionError::Status { status: 503, .. })));
        assert_eq!(provisioner.cached_domains(), 0);

        authority.fail.store(false, Ordering::SeqCst);
        provisioner.provision("api.example.org").await.unwrap();
        assert_eq!(authority.calls(), 2);
        assert_eq!(provisioner.cached_domains(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_handshakes_fetch_once() {
        let authority = Arc::new(FakeAuthority::with_delay(Duration::from_millis(50)));
        let provisioner = Arc::new(CertProvisioner::new(authority.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let provisioner = Arc::clone(&provisioner);
                tokio::spawn(async move {
                    provisioner
                        .provision(&format!("host{i}.shop.example.com"))
                        .await
                })
            })
            .collect();

        let mut keys = Vec::new();
        for task in tasks {
            keys.push(task.await.unwrap().unwrap());
        }

        assert_eq!(authority.calls(), 1);
        assert!(keys.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_different_domains_do_not_serialize() {
        let authority = Arc::new(FakeAuthority::with_delay(Duration::from_millis(200)));
        let provisioner = Arc::new(CertProvisioner::new(authority.clone()));

        let start = Instant::now();
        let a = {
            let provisioner = Arc::clone(&provisioner);
            tokio::spawn(async move { provisioner.provision("one.example.com").await })
        };
        let b = {
            let provisioner = Arc::clone(&provisioner);
            tokio::spawn(async move { provisioner.provision("two.example.net").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(authority.calls(), 2);
        // Two sequential fetches would take at least 400ms
        assert!(start.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_ttl_refreshes_stale_certificate() {
        let authority = Arc::new(FakeAuthority::new());
        let provisioner = CertProvisioner::new(authority.clone())
            .with_ttl(Some(Duration::from_millis(20)));

        let first = provisioner.provision("example.com").await.unwrap();
        let again = provisioner.provision("example.com").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        tokio::time::sleep(Duration::from_millis(40)).await;
        let refreshed = provisioner.provision("example.com").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(authority.calls(), 2);
        assert_eq!(provisioner.cached_domains(), 1);
    }
}

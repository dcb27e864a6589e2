//! In-process origins, collectors and proxies for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tap_proxy::certs::{CertProvisioner, CertificateAuthority, ProvisionError, SignedPair};
use tap_proxy::collector::CollectorClient;
use tap_proxy::config::Config;
use tap_proxy::proxy::{LocalAddrs, ProxyServer, ProxyState};
use tap_proxy::rules::{RuleSpec, RuleStore};
use tokio::net::{TcpListener, TcpStream};

/// A request as received by a test server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Plain HTTP server that records every request.
pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    /// Wait until at least `count` requests arrived.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<Recorded> {
        for _ in 0..100 {
            let requests = self.requests();
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {count} requests, got {}", self.requests().len());
    }
}

pub async fn spawn_server<F>(respond: F) -> TestServer
where
    F: Fn(&Recorded) -> Response<Full<Bytes>> + Send + Sync + 'static,
{
    spawn_server_with_delay(Duration::ZERO, respond).await
}

/// Like [`spawn_server`], but every response is held back for `delay`.
pub async fn spawn_server_with_delay<F>(delay: Duration, respond: F) -> TestServer
where
    F: Fn(&Recorded) -> Response<Full<Bytes>> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let recorded = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let recorded = Arc::clone(&recorded);
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let recorded = Arc::clone(&recorded);
                    let respond = Arc::clone(&respond);
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await.unwrap().to_bytes();
                        let request = Recorded {
                            method: parts.method,
                            uri: parts.uri,
                            headers: parts.headers,
                            body,
                        };
                        recorded.lock().push(request.clone());
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, Infallible>(respond(&request))
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    TestServer { addr, requests }
}

pub fn response(status: u16, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

/// Signs self-signed certificates and remembers what it issued.
#[derive(Default)]
pub struct FakeAuthority {
    pub issued: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: AtomicBool,
}

impl FakeAuthority {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn issued_domains(&self) -> Vec<String> {
        self.issued.lock().iter().map(|(d, _)| d.clone()).collect()
    }
}

#[async_trait]
impl CertificateAuthority for FakeAuthority {
    async fn sign(&self, domain: &str) -> Result<SignedPair, ProvisionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProvisionError::Status {
                domain: domain.to_string(),
                status: 500,
            });
        }
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec![domain.to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        self.issued
            .lock()
            .push((domain.to_string(), cert.der().to_vec()));
        Ok(SignedPair {
            cert: cert.pem(),
            key: key.serialize_pem(),
        })
    }
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub rules: Arc<RuleStore>,
    pub server: Arc<ProxyServer>,
}

impl TestProxy {
    pub fn add_rule(&self, regexp: &str, out_type: &str, out_server: &str, group: &str) {
        let spec: RuleSpec = serde_json::from_value(serde_json::json!({
            "regexp": regexp,
            "out_type": out_type,
            "out_server": out_server,
            "group": group,
        }))
        .unwrap();
        self.rules.upsert(spec).unwrap();
    }
}

/// Proxy whose only "local" address is a documentation address, so
/// requests addressed to 127.0.0.1 are forwarded.
pub async fn start_proxy(config: Config) -> TestProxy {
    start_proxy_with_local(config, vec!["192.0.2.1".parse().unwrap()]).await
}

pub async fn start_proxy_with_local(config: Config, local: Vec<IpAddr>) -> TestProxy {
    let rules = Arc::new(RuleStore::new());
    let collector = Arc::new(CollectorClient::new(&config.collector).unwrap());
    let state = ProxyState::new(&config, Arc::clone(&rules), collector)
        .unwrap()
        .with_local_addrs(LocalAddrs::from_addrs(local));
    let provisioner = Arc::new(CertProvisioner::new(Arc::new(FakeAuthority::default())));
    let server = Arc::new(ProxyServer::new(state, provisioner));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).serve_http(listener));

    TestProxy {
        addr,
        rules,
        server,
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send one request over a fresh connection with an explicit Host header.
pub async fn send(proxy: SocketAddr, req: Request<Full<Bytes>>) -> Reply {
    let stream = TcpStream::connect(proxy).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let response = sender.send_request(req).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

pub fn get(host: &str, path: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("host", host)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn post(host: &str, path: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("host", host)
        .body(Full::new(body.into()))
        .unwrap()
}

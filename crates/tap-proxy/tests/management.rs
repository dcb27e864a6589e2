//! Management requests addressed to the proxy's own interface address.

mod common;

use common::*;
use hyper::StatusCode;
use tap_proxy::config::Config;
use tap_proxy::rules::{Disposition, RuleSpec};

async fn start_local_proxy() -> TestProxy {
    start_proxy_with_local(Config::default(), vec!["127.0.0.1".parse().unwrap()]).await
}

#[tokio::test]
async fn test_upsert_and_list_rules() {
    let proxy = start_local_proxy().await;

    let reply = send(
        proxy.addr,
        post(
            "127.0.0.1",
            "/",
            r#"{"regexp": "api\\.shop\\.com/cart", "out_type": "chan", "out_server": "remote:9000", "group": "cart"}"#,
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "ok: api\\.shop\\.com/cart -> mirror(remote:9000)");

    let reply = send(proxy.addr, get(&format!("127.0.0.1:{}", proxy.addr.port()), "/")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text().ends_with('\n'));
    let rules: Vec<RuleSpec> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].regexp, "api\\.shop\\.com/cart");
    assert_eq!(rules[0].out_server, "remote:9000");
    assert_eq!(rules[0].group, "cart");
}

#[tokio::test]
async fn test_replace_keeps_position() {
    let proxy = start_local_proxy().await;
    proxy.add_rule("first", "log", "a:1", "");
    proxy.add_rule("second", "log", "b:2", "");

    let reply = send(
        proxy.addr,
        post("127.0.0.1", "/", r#"{"regexp": "first", "out_type": "none"}"#),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "ok: first -> none");

    let rules = proxy.rules.list();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].pattern(), "first");
    assert_eq!(rules[0].disposition(), &Disposition::None);
    assert_eq!(rules[1].pattern(), "second");
}

#[tokio::test]
async fn test_invalid_rules_leave_store_untouched() {
    let proxy = start_local_proxy().await;
    proxy.add_rule("kept", "log", "a:1", "");

    let reply = send(
        proxy.addr,
        post("127.0.0.1", "/", r#"{"regexp": "(unclosed", "out_type": "log", "out_server": "a:1"}"#),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(proxy.addr, post("127.0.0.1", "/", "{not json")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        proxy.addr,
        post("127.0.0.1", "/", r#"{"regexp": "nowhere", "out_type": "log"}"#),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert_eq!(proxy.rules.len(), 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let proxy = start_local_proxy().await;
    proxy.add_rule("x", "log", "a:1", "");

    // Generate at least one request sample
    let _ = send(
        proxy.addr,
        hyper::Request::builder()
            .method(hyper::Method::DELETE)
            .uri("/")
            .header("host", "192.0.2.55")
            .body(http_body_util::Full::new(bytes::Bytes::new()))
            .unwrap(),
    )
    .await;

    let reply = send(proxy.addr, get("127.0.0.1", "/metrics")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text().contains("tap_requests_total"));
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let proxy = start_local_proxy().await;
    let req = hyper::Request::builder()
        .method(hyper::Method::DELETE)
        .uri("/")
        .header("host", "127.0.0.1")
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .unwrap();
    let reply = send(proxy.addr, req).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
}

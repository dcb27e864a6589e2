//! Management handlers: rule listing, rule upsert, metrics.

use super::types::{error_response, json_response, text_response};
use crate::metrics;
use crate::rules::{OutRule, RuleSpec, RuleStore, UpsertOutcome};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::{info, warn};

/// GET - every rule in evaluation order
pub fn handle_list(rules: &RuleStore) -> Response<Full<Bytes>> {
    let specs: Vec<RuleSpec> = rules.list().iter().map(|rule| rule.to_spec()).collect();
    json_response(StatusCode::OK, &specs)
}

/// POST - insert a rule or replace the one with the same pattern
pub fn handle_upsert(rules: &RuleStore, body: &[u8]) -> Response<Full<Bytes>> {
    let spec: RuleSpec = match serde_json::from_slice(body) {
        Ok(spec) => spec,
        Err(e) => {
            metrics::record_rule_update("rejected");
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid rule: {e}"));
        }
    };

    let rule = match OutRule::compile(spec) {
        Ok(rule) => rule,
        Err(e) => {
            metrics::record_rule_update("rejected");
            warn!("Rejected rule: {}", e);
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    let summary = format!("{} -> {}", rule.pattern(), rule.disposition());
    let action = match rules.upsert_compiled(rule) {
        UpsertOutcome::Inserted => "inserted",
        UpsertOutcome::Replaced => "replaced",
    };
    metrics::record_rule_update(action);
    info!("Rule {}: {}", action, summary);
    text_response(StatusCode::OK, format!("ok: {summary}"))
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    super::types::build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
}

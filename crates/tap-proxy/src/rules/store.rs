//! Ordered, concurrently readable rule table.

use super::types::{OutRule, RuleError, RuleMatch, RuleSpec};
use parking_lot::RwLock;
use std::net::IpAddr;
use tracing::debug;

/// Whether an upsert added a rule or replaced one with the same pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Rule store. Evaluation order is insertion order; the first matching rule wins.
#[derive(Default)]
pub struct RuleStore {
    rules: RwLock<Vec<OutRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and insert a rule, replacing any rule with the same pattern.
    ///
    /// The pattern is compiled before the write lock is taken, so an invalid
    /// rule leaves the store untouched.
    pub fn upsert(&self, spec: RuleSpec) -> Result<UpsertOutcome, RuleError> {
        let rule = OutRule::compile(spec)?;
        Ok(self.upsert_compiled(rule))
    }

    pub fn upsert_compiled(&self, rule: OutRule) -> UpsertOutcome {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.pattern() == rule.pattern()) {
            Some(existing) => {
                debug!("Replacing rule '{}' -> {}", rule.pattern(), rule.disposition());
                *existing = rule;
                UpsertOutcome::Replaced
            }
            None => {
                debug!("Adding rule '{}' -> {}", rule.pattern(), rule.disposition());
                rules.push(rule);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Find the first rule matching `request_key` (`host + request-uri`).
    pub fn match_request(&self, request_key: &str, remote: IpAddr) -> RuleMatch {
        let rules = self.rules.read();
        rules
            .iter()
            .find(|rule| rule.is_match(request_key))
            .map(|rule| rule.resolve(remote))
            .unwrap_or_else(RuleMatch::none)
    }

    /// Snapshot of all rules in evaluation order.
    pub fn list(&self) -> Vec<OutRule> {
        self.rules.read().clone()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

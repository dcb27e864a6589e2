//! Output rule types and their wire representation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Token in a collector address that is replaced by the caller's IP at match time.
pub const REMOTE_TOKEN: &str = "remote";

/// Wire form of a disposition, as used by the management API and rule files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutType {
    #[default]
    None,
    /// Older rule files call this `chan`, after the collector endpoint.
    #[serde(alias = "chan")]
    Mirror,
    Log,
}

impl OutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutType::None => "none",
            OutType::Mirror => "mirror",
            OutType::Log => "log",
        }
    }
}

/// A rule as submitted over the management surface or read from a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    /// Regular expression matched against `host + request-uri`.
    pub regexp: String,
    #[serde(default)]
    pub out_type: OutType,
    /// Collector address, e.g. `collector:8080` or `remote:9000`.
    #[serde(default)]
    pub out_server: String,
    #[serde(default)]
    pub group: String,
}

/// What a matched rule does with the traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    None,
    /// Synchronous call whose response replaces the forwarded body.
    Mirror(String),
    /// Fire-and-forget snapshot.
    Log(String),
}

impl Disposition {
    pub fn out_type(&self) -> OutType {
        match self {
            Disposition::None => OutType::None,
            Disposition::Mirror(_) => OutType::Mirror,
            Disposition::Log(_) => OutType::Log,
        }
    }

    pub fn collector(&self) -> Option<&str> {
        match self {
            Disposition::None => None,
            Disposition::Mirror(addr) | Disposition::Log(addr) => Some(addr),
        }
    }

    fn with_remote(&self, remote: IpAddr) -> Disposition {
        // IPv6 hosts are bracketed so a following `:port` stays unambiguous
        let host = match remote.to_canonical() {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        let substitute = |addr: &str| {
            if addr.contains(REMOTE_TOKEN) {
                addr.replace(REMOTE_TOKEN, &host)
            } else {
                addr.to_string()
            }
        };
        match self {
            Disposition::None => Disposition::None,
            Disposition::Mirror(addr) => Disposition::Mirror(substitute(addr)),
            Disposition::Log(addr) => Disposition::Log(substitute(addr)),
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::None => write!(f, "none"),
            Disposition::Mirror(addr) => write!(f, "mirror({addr})"),
            Disposition::Log(addr) => write!(f, "log({addr})"),
        }
    }
}

/// A rule with its compiled matcher. Immutable once built; replacing a rule
/// means building a new one from a new [`RuleSpec`].
#[derive(Debug, Clone)]
pub struct OutRule {
    pattern: String,
    matcher: Regex,
    disposition: Disposition,
    group: String,
}

impl OutRule {
    pub fn compile(spec: RuleSpec) -> Result<Self, RuleError> {
        let matcher = Regex::new(&spec.regexp).map_err(|source| RuleError::Pattern {
            pattern: spec.regexp.clone(),
            source,
        })?;

        let disposition = match spec.out_type {
            OutType::None => Disposition::None,
            OutType::Mirror | OutType::Log if spec.out_server.trim().is_empty() => {
                return Err(RuleError::MissingCollector {
                    pattern: spec.regexp,
                    out_type: spec.out_type,
                });
            }
            OutType::Mirror => Disposition::Mirror(spec.out_server.trim().to_string()),
            OutType::Log => Disposition::Log(spec.out_server.trim().to_string()),
        };

        Ok(Self {
            pattern: spec.regexp,
            matcher,
            disposition,
            group: spec.group,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_match(&self, request_key: &str) -> bool {
        self.matcher.is_match(request_key)
    }

    /// Resolve the rule for a concrete caller.
    pub(crate) fn resolve(&self, remote: IpAddr) -> RuleMatch {
        RuleMatch {
            disposition: self.disposition.with_remote(remote),
            group: self.group.clone(),
        }
    }

    pub fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            regexp: self.pattern.clone(),
            out_type: self.disposition.out_type(),
            out_server: self.disposition.collector().unwrap_or_default().to_string(),
            group: self.group.clone(),
        }
    }
}

/// Result of a rule lookup for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub disposition: Disposition,
    pub group: String,
}

impl RuleMatch {
    pub fn none() -> Self {
        Self {
            disposition: Disposition::None,
            group: String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule '{pattern}' has out_type '{}' but no out_server", out_type.as_str())]
    MissingCollector { pattern: String, out_type: OutType },
}

//! Output rules: which proxied traffic gets mirrored or logged, and where to.
//!
//! - `types` - rule wire format, compiled rules and dispositions
//! - `store` - the ordered rule table shared by the proxy and management API
//! - `loader` - startup rule file

mod loader;
mod store;
mod types;

pub use loader::{load_rules_file, LoadSummary};
pub use store::{RuleStore, UpsertOutcome};
pub use types::{Disposition, OutRule, OutType, RuleError, RuleMatch, RuleSpec, REMOTE_TOKEN};

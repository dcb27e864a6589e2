//! Startup rule file.
//!
//! The file holds a JSON array of rule objects in the same shape the
//! management endpoint accepts. Each entry goes through [`RuleStore::upsert`];
//! a bad entry is skipped with a warning and never aborts startup.

use super::store::RuleStore;
use super::types::RuleSpec;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Apply the rules in `path` to `store`.
///
/// A missing file is not an error. A file that is not a JSON array is an
/// error for the caller to report; individual malformed rules are not.
pub fn load_rules_file(store: &RuleStore, path: &Path) -> Result<LoadSummary, anyhow::Error> {
    if !path.exists() {
        debug!("Rule file {:?} does not exist, starting with an empty rule set", path);
        return Ok(LoadSummary::default());
    }

    let contents = fs::read_to_string(path)?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Rule file {path:?} is not a JSON array: {e}"))?;

    let mut summary = LoadSummary::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let spec: RuleSpec = match serde_json::from_value(entry) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("Skipping rule #{} in {:?}: {}", index, path, e);
                summary.skipped += 1;
                continue;
            }
        };

        match store.upsert(spec) {
            Ok(_) => summary.applied += 1,
            Err(e) => {
                warn!("Skipping rule #{} in {:?}: {}", index, path, e);
                summary.skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} rules from {:?} ({} skipped)",
        summary.applied, path, summary.skipped
    );
    Ok(summary)
}

//! Collector call settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Upper bound on a synchronous mirror call; on expiry the original body is forwarded.
    #[serde(default = "default_mirror_timeout_ms")]
    pub mirror_timeout_ms: u64,
    /// Number of tasks draining the log queue (0 = auto-detect CPU count)
    #[serde(default)]
    pub log_workers: usize,
    /// Pending log snapshots beyond this are dropped
    #[serde(default = "default_log_queue_size")]
    pub log_queue_size: usize,
}

fn default_mirror_timeout_ms() -> u64 {
    5000
}

fn default_log_queue_size() -> usize {
    1024
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mirror_timeout_ms: default_mirror_timeout_ms(),
            log_workers: 0,
            log_queue_size: default_log_queue_size(),
        }
    }
}

impl CollectorConfig {
    pub fn effective_log_workers(&self) -> usize {
        if self.log_workers == 0 {
            num_cpus::get().clamp(2, 16)
        } else {
            self.log_workers
        }
    }
}

//! HTTP calls to collector services.

use super::dispatcher::LogDispatcher;
use super::snapshot::Snapshot;
use super::CollectorError;
use crate::config::CollectorConfig;
use crate::metrics;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

pub const MIRROR_ENDPOINT: &str = "/chan";
pub const LOG_ENDPOINT: &str = "/log";

/// `http://{address}{endpoint}`; an address that already carries a scheme is kept.
pub fn collector_url(address: &str, endpoint: &str) -> String {
    let base = address.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}{endpoint}")
    } else {
        format!("http://{base}{endpoint}")
    }
}

pub struct CollectorClient {
    http: reqwest::Client,
    mirror_timeout: Duration,
    logs: LogDispatcher,
}

impl CollectorClient {
    /// Build the client and start the log workers. Must run inside a tokio runtime.
    pub fn new(config: &CollectorConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let mirror_timeout = Duration::from_millis(config.mirror_timeout_ms);
        let logs = LogDispatcher::spawn(
            http.clone(),
            mirror_timeout,
            config.effective_log_workers(),
            config.log_queue_size,
        );

        Ok(Self {
            http,
            mirror_timeout,
            logs,
        })
    }

    /// POST the snapshot to `collector/chan` and return the replacement body.
    pub async fn mirror(&self, collector: &str, snapshot: &Snapshot) -> Result<Bytes, CollectorError> {
        let url = collector_url(collector, MIRROR_ENDPOINT);
        debug!("Mirroring {} to {}", snapshot.uri, url);

        let call = async {
            let response = self.http.post(&url).json(snapshot).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(CollectorError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }
            Ok::<_, CollectorError>(response.bytes().await?)
        };

        let result = match tokio::time::timeout(self.mirror_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Timeout {
                url: url.clone(),
                timeout: self.mirror_timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(CollectorError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::record_collector_call("mirror", outcome);
        result
    }

    /// Queue the snapshot for `collector/log` without waiting.
    pub fn log(&self, collector: &str, snapshot: Snapshot) -> bool {
        self.logs.submit(collector, snapshot)
    }

    pub fn log_queue_depth(&self) -> usize {
        self.logs.queue_depth()
    }
}

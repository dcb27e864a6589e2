//! Bounded background delivery of log snapshots.
//!
//! A fixed set of worker tasks drains a bounded queue. Submitting never waits:
//! when the queue is full the snapshot is dropped and counted.

use super::client::{collector_url, LOG_ENDPOINT};
use super::snapshot::Snapshot;
use crate::metrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

struct LogJob {
    url: String,
    snapshot: Snapshot,
}

pub struct LogDispatcher {
    work_tx: mpsc::Sender<LogJob>,
    queue_depth: Arc<AtomicUsize>,
    workers: usize,
}

impl LogDispatcher {
    /// Spawn `workers` delivery tasks on the current tokio runtime.
    pub fn spawn(http: reqwest::Client, timeout: Duration, workers: usize, queue_size: usize) -> Self {
        info!(
            "Starting log dispatcher with {} workers, queue size {}",
            workers, queue_size
        );

        let (work_tx, work_rx) = mpsc::channel(queue_size);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let queue_depth = Arc::new(AtomicUsize::new(0));

        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let queue_depth = Arc::clone(&queue_depth);
            let http = http.clone();
            tokio::spawn(async move {
                loop {
                    let job = { work_rx.lock().await.recv().await };
                    let Some(job) = job else {
                        debug!("Log worker {} channel closed", worker_id);
                        break;
                    };
                    queue_depth.fetch_sub(1, Ordering::Relaxed);
                    deliver(&http, timeout, job).await;
                }
            });
        }

        Self {
            work_tx,
            queue_depth,
            workers,
        }
    }

    /// Queue a snapshot for `collector/log`. Returns false if it was dropped.
    pub fn submit(&self, collector: &str, snapshot: Snapshot) -> bool {
        let job = LogJob {
            url: collector_url(collector, LOG_ENDPOINT),
            snapshot,
        };

        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        match self.work_tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.queue_depth.fetch_sub(1, Ordering::Relaxed);
                warn!("Log queue is full, dropping snapshot for {}", job.url);
                metrics::record_collector_call("log", "dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.queue_depth.fetch_sub(1, Ordering::Relaxed);
                warn!("Log dispatcher is shut down, dropping snapshot for {}", job.url);
                metrics::record_collector_call("log", "dropped");
                false
            }
        }
    }

    /// Snapshots waiting for a worker
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }
}

async fn deliver(http: &reqwest::Client, timeout: Duration, job: LogJob) {
    let result = http
        .post(&job.url)
        .timeout(timeout)
        .json(&job.snapshot)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            // Drain the body so the connection can be reused
            let _ = response.bytes().await;
            metrics::record_collector_call("log", "success");
        }
        Ok(response) => {
            warn!(
                "Log collector {} answered with status {}",
                job.url,
                response.status()
            );
            metrics::record_collector_call("log", "error");
        }
        Err(e) => {
            warn!("Log collector {} failed: {}", job.url, e);
            metrics::record_collector_call("log", "error");
        }
    }
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background writer for activity records and content fingerprints.
//!
//! The gate hands allowed actions to a bounded queue drained by a single
//! worker. When the queue is full the caller waits up to `enqueue_wait`
//! for space, then the job is dropped and counted. Write failures are
//! logged and swallowed: these ledgers are auditing, not safety.

use crate::error::StoreError;
use crate::evaluator::Ledgers;
use crate::metrics::Metrics;
use crate::models::{ActivityRecord, ContentFingerprint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Work item for the recorder.
#[derive(Debug)]
pub enum RecordJob {
    Activity(ActivityRecord),
    Fingerprint(ContentFingerprint),
    /// Completes once every job queued before it has been written
    Flush(oneshot::Sender<()>),
}

/// Handle for enqueueing writes. Cheap to clone.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<RecordJob>,
    metrics: Arc<Metrics>,
    enqueue_wait: Duration,
}

impl Recorder {
    /// Start the worker on the current runtime.
    pub fn spawn(
        ledgers: Ledgers,
        metrics: Arc<Metrics>,
        capacity: usize,
        enqueue_wait: Duration,
        write_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, ledgers, metrics.clone(), write_timeout));
        (
            Self {
                tx,
                metrics,
                enqueue_wait,
            },
            worker,
        )
    }

    /// Queue a job. Returns `false` if it was dropped.
    pub async fn submit(&self, job: RecordJob) -> bool {
        let job = match self.tx.try_send(job) {
            Ok(()) => return true,
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Closed(_)) => {
                warn!("Recorder queue closed, dropping write");
                self.metrics.recorder_dropped();
                return false;
            }
        };

        match self.tx.send_timeout(job, self.enqueue_wait).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    wait_ms = self.enqueue_wait.as_millis() as u64,
                    "Recorder queue full, dropping write"
                );
                self.metrics.recorder_dropped();
                false
            }
        }
    }

    pub async fn record_activity(&self, record: ActivityRecord) -> bool {
        self.submit(RecordJob::Activity(record)).await
    }

    pub async fn record_fingerprint(&self, fingerprint: ContentFingerprint) -> bool {
        self.submit(RecordJob::Fingerprint(fingerprint)).await
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(RecordJob::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<RecordJob>,
    ledgers: Ledgers,
    metrics: Arc<Metrics>,
    write_timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        match job {
            RecordJob::Activity(record) => {
                let id = record.id;
                let result = bounded(write_timeout, ledgers.activities.append(record)).await;
                match result {
                    Ok(()) => debug!(%id, "Activity recorded"),
                    Err(err) => {
                        warn!(%id, error = %err, "Failed to record activity");
                        metrics.store_failure("activity_append");
                    }
                }
            }
            RecordJob::Fingerprint(fingerprint) => {
                let id = fingerprint.id;
                let result = bounded(write_timeout, ledgers.fingerprints.append(fingerprint)).await;
                match result {
                    Ok(()) => debug!(%id, "Fingerprint recorded"),
                    Err(err) => {
                        warn!(%id, error = %err, "Failed to record content fingerprint");
                        metrics.store_failure("fingerprint_append");
                    }
                }
            }
            RecordJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Recorder worker stopped");
}

async fn bounded<F>(timeout: Duration, fut: F) -> Result<(), StoreError>
where
    F: std::future::Future<Output = Result<(), StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(StoreError::Timeout(timeout)))
}

//! Worker pool for standardizing documents in parallel.
//!
//! Workers pull [`DocumentJob`]s from a shared channel and run the engine on
//! tokio's blocking pool, since matching and store writes are synchronous.
//! A document is always handled by a single worker, so all writes for its
//! citation ids go through one batch.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{DocumentReport, StandardizationEngine};
use crate::store::StatusStore;
use crate::{Document, ProgressEvent, RunStats};

/// A document submitted to the pool.
pub struct DocumentJob {
    pub document: Document,
    pub result_tx: oneshot::Sender<DocumentReport>,
    pub doc_index: usize,
    pub total: usize,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// Submit jobs via [`submit()`](StandardizationPool::submit) and await the
/// oneshot receiver paired with each one.
pub struct StandardizationPool {
    job_tx: async_channel::Sender<DocumentJob>,
    pool_handle: JoinHandle<()>,
}

impl StandardizationPool {
    pub fn new(
        engine: Arc<StandardizationEngine>,
        store: Arc<dyn StatusStore>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<DocumentJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    engine.clone(),
                    store.clone(),
                    cancel.clone(),
                )));
            }
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: DocumentJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<DocumentJob>,
    engine: Arc<StandardizationEngine>,
    store: Arc<dyn StatusStore>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let DocumentJob {
            document,
            result_tx,
            doc_index,
            total,
            progress,
        } = job;
        let pid = document.pid.clone();

        progress(ProgressEvent::DocumentStarted {
            index: doc_index,
            total,
            pid: pid.clone(),
        });

        let engine = engine.clone();
        let store = store.clone();
        let report = match tokio::task::spawn_blocking(move || {
            engine.process_document(&document, store.as_ref())
        })
        .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(pid = %pid, error = %e, "standardization task failed");
                progress(ProgressEvent::Warning {
                    pid: pid.clone(),
                    message: format!("standardization task failed: {e}"),
                });
                DocumentReport {
                    pid: pid.clone(),
                    write_error: Some(e.to_string()),
                    ..DocumentReport::default()
                }
            }
        };

        if let Some(err) = &report.write_error {
            progress(ProgressEvent::Warning {
                pid: pid.clone(),
                message: format!("records not persisted: {err}"),
            });
        }

        progress(ProgressEvent::DocumentFinished {
            index: doc_index,
            total,
            pid,
            standardized: report.standardized(),
            not_normalized: report.not_normalized(),
            skipped: report.skipped(),
        });

        let _ = result_tx.send(report);
    }
}

/// Run every document through a fresh pool and fold the reports.
///
/// Stops submitting once `cancel` fires; documents already queued but not
/// yet picked up are dropped and `RunStats::cancelled` is set.
pub async fn standardize_documents(
    documents: Vec<Document>,
    engine: Arc<StandardizationEngine>,
    store: Arc<dyn StatusStore>,
    num_workers: usize,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> RunStats {
    let total = documents.len();
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
    let pool = StandardizationPool::new(engine, store, cancel.clone(), num_workers);

    let mut receivers = Vec::with_capacity(total);
    for (doc_index, document) in documents.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(DocumentJob {
            document,
            result_tx,
            doc_index,
            total,
            progress: progress.clone(),
        })
        .await;
        receivers.push(result_rx);
    }

    let mut stats = RunStats::default();
    let mut remaining = Vec::new();
    let mut pending = receivers.into_iter();
    while let Some(mut rx) = pending.next() {
        tokio::select! {
            report = &mut rx => {
                if let Ok(report) = report {
                    stats.record(&report);
                }
            }
            _ = cancel.cancelled() => {
                remaining.push(rx);
                remaining.extend(pending.by_ref());
                break;
            }
        }
    }

    pool.shutdown().await;

    // Workers are gone: each receiver now holds either a finished report or
    // an error for a job dropped from the queue.
    for rx in remaining {
        if let Ok(report) = rx.await {
            stats.record(&report);
        }
    }
    stats.cancelled = cancel.is_cancelled();

    tracing::info!(
        documents = stats.documents,
        citations = stats.citations,
        standardized = stats.standardized,
        not_normalized = stats.not_normalized,
        written = stats.records_written,
        cancelled = stats.cancelled,
        "standardization run finished"
    );
    stats
}

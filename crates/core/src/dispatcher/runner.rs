//! Document dispatcher: a pool of workers draining the work queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document::{Document, DocumentFilter, DocumentStatus, DocumentStore, TransitionError};
use crate::events::ProgressPublisher;
use crate::metrics::{REDELIVERIES, RETRIES_TOTAL, TASKS_ACTIVE, TASKS_TOTAL, TASK_DURATION};
use crate::queue::{Delivery, WorkItem, WorkQueue};
use crate::status::QueueStatusAggregator;

use super::config::DispatcherConfig;
use super::pipeline::{Collaborators, DocumentPipeline, TaskOutcome, Totals};
use super::types::{DispatchError, DispatcherStatus, TaskHandle};

/// Drives queued documents through the pipeline.
///
/// Each worker claims one item at a time, runs it to a terminal state and
/// only then acks it. A task that dies mid-way is redelivered once its lease
/// lapses. Writes are compare-and-set on the document attempt, so a task
/// superseded by a retry can never overwrite the newer attempt's result.
pub struct DocumentDispatcher {
    config: DispatcherConfig,
    queue: Arc<dyn WorkQueue>,
    pipeline: Arc<DocumentPipeline>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    wake: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DocumentDispatcher {
    /// Create a new dispatcher. Workers are not started until [`start`](Self::start).
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn WorkQueue>,
        collaborators: Collaborators,
        publisher: ProgressPublisher,
        aggregator: Arc<QueueStatusAggregator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let pipeline = DocumentPipeline {
            store,
            collaborators,
            publisher,
            aggregator,
            stage_timeout: config.stage_timeout(),
            active: RwLock::new(HashMap::new()),
            totals: Totals::default(),
        };

        Self {
            config,
            queue,
            pipeline: Arc::new(pipeline),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            wake: Arc::new(Notify::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the worker pool (spawns background tasks).
    pub async fn start(&self) -> Result<(), DispatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Dispatcher already running");
            return Ok(());
        }

        info!(workers = self.config.workers, "Starting document dispatcher");

        if let Err(e) = self.recover().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.workers.max(1) {
            workers.push(self.spawn_worker(worker_id));
        }

        info!("Document dispatcher started");
        Ok(())
    }

    /// Stop the worker pool. In-flight tasks get the configured grace period to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Dispatcher not running");
            return;
        }

        info!("Stopping document dispatcher");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Worker did not finish in time; its task will be redelivered");
                handle.abort();
            }
        }

        info!("Document dispatcher stopped");
    }

    /// Get current dispatcher status.
    pub async fn status(&self) -> DispatcherStatus {
        let pending = self.queue.pending().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read queue depth");
            0
        });

        let mut active_tasks: Vec<_> = self.pipeline.active.read().await.values().cloned().collect();
        active_tasks.sort_by_key(|t| t.started_at);

        DispatcherStatus {
            running: self.is_running(),
            workers: self.config.workers,
            pending,
            active_tasks,
            completed: self.pipeline.totals.completed.load(Ordering::Relaxed),
            failed: self.pipeline.totals.failed.load(Ordering::Relaxed),
        }
    }

    /// Enqueue a queued document for processing. Fire and forget.
    pub async fn submit(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<TaskHandle, DispatchError> {
        let document = self.owned_document(document_id, owner_id)?;

        if !matches!(
            document.status,
            DocumentStatus::Queued | DocumentStatus::Processing
        ) {
            return Err(DispatchError::InvalidTransition(TransitionError {
                document_id: document.id,
                from: document.status,
                to: DocumentStatus::Processing,
            }));
        }

        self.enqueue(WorkItem::new(document.id, document.owner_id, document.attempt))
            .await
    }

    /// Enqueue every queued document of a batch and announce the batch aggregate.
    pub async fn submit_batch(
        &self,
        batch_id: &str,
        owner_id: &str,
    ) -> Result<Vec<TaskHandle>, DispatchError> {
        let batch = self
            .pipeline
            .store
            .get_batch(batch_id)?
            .filter(|b| b.owner_id == owner_id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "batch",
                id: batch_id.to_string(),
            })?;

        let documents = self.pipeline.store.list_documents(
            &DocumentFilter::new()
                .with_batch(&batch.id)
                .with_status(DocumentStatus::Queued)
                .with_limit(i64::MAX),
        )?;

        let mut handles = Vec::with_capacity(documents.len());
        for document in documents {
            handles.push(
                self.enqueue(WorkItem::new(document.id, document.owner_id, document.attempt))
                    .await?,
            );
        }

        info!(batch_id = %batch.id, documents = handles.len(), "Batch submitted");
        self.pipeline
            .publish_batch_progress(&batch.id, &batch.owner_id)
            .await;
        Ok(handles)
    }

    /// Explicit retry of a failed document: back to the queue under a new attempt.
    pub async fn retry(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<TaskHandle, DispatchError> {
        let document = self.owned_document(document_id, owner_id)?;
        if !document.status.can_retry() {
            return Err(DispatchError::InvalidTransition(TransitionError {
                document_id: document.id,
                from: document.status,
                to: DocumentStatus::Queued,
            }));
        }

        let document = self.pipeline.store.reset_for_retry(&document.id)?;
        RETRIES_TOTAL.inc();
        info!(document_id = %document.id, attempt = document.attempt, "Document queued for retry");

        let handle = self
            .enqueue(WorkItem::new(
                document.id.clone(),
                document.owner_id.clone(),
                document.attempt,
            ))
            .await?;

        self.pipeline.publisher.document_requeued(&document).await;
        self.pipeline
            .publish_batch_progress(&document.batch_id, &document.owner_id)
            .await;
        Ok(handle)
    }

    fn owned_document(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Document, DispatchError> {
        self.pipeline
            .store
            .get_document(document_id)?
            .filter(|d| d.owner_id == owner_id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "document",
                id: document_id.to_string(),
            })
    }

    async fn enqueue(&self, item: WorkItem) -> Result<TaskHandle, DispatchError> {
        let task_id = item.task_id();
        let document_id = item.document_id.clone();
        let attempt = item.attempt;

        let enqueued = self.queue.enqueue(item).await?;
        if enqueued {
            self.wake.notify_waiters();
        }
        debug!(task_id = %task_id, enqueued, "Work item submitted");

        Ok(TaskHandle {
            task_id,
            document_id,
            attempt,
            enqueued,
        })
    }

    /// Re-enqueue everything that was queued or mid-flight when we last stopped.
    async fn recover(&self) -> Result<(), DispatchError> {
        let documents = self.pipeline.store.list_documents(
            &DocumentFilter::new()
                .with_status(DocumentStatus::Queued)
                .with_status(DocumentStatus::Processing)
                .with_limit(i64::MAX),
        )?;

        let mut recovered = 0usize;
        for document in documents {
            let item = WorkItem::new(document.id, document.owner_id, document.attempt);
            if self.queue.enqueue(item).await? {
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(recovered, "Recovered unfinished documents");
        }
        Ok(())
    }

    /// Spawn one worker loop.
    fn spawn_worker(&self, worker_id: usize) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let wake = Arc::clone(&self.wake);
        let poll_interval = self.config.poll_interval();
        let timing = DeliveryTiming {
            lease_renewal: (self.queue.lease() / 3).max(Duration::from_millis(10)),
            failure_backoff: self.config.failure_backoff(),
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker_id, "Worker started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let delivery = match queue.claim().await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = wake.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(worker_id, error = %e, "Failed to claim work item");
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                        continue;
                    }
                };

                Self::handle_delivery(worker_id, &queue, &pipeline, timing, delivery).await;
            }
            debug!(worker_id, "Worker stopped");
        })
    }

    /// Run one delivery to completion and ack it. Errors and panics stay inside this task.
    ///
    /// The lease is renewed while the task runs, so a slow task is never
    /// handed to a second worker.
    async fn handle_delivery(
        worker_id: usize,
        queue: &Arc<dyn WorkQueue>,
        pipeline: &Arc<DocumentPipeline>,
        timing: DeliveryTiming,
        delivery: Delivery,
    ) {
        let item = delivery.item.clone();
        if delivery.is_redelivery() {
            REDELIVERIES.inc();
            info!(
                worker_id,
                document_id = %item.document_id,
                delivery_count = delivery.delivery_count,
                "Redelivered work item"
            );
        }

        TASKS_ACTIVE.inc();
        let started = Instant::now();

        let mut task = {
            let pipeline = Arc::clone(pipeline);
            let item = item.clone();
            tokio::spawn(async move { pipeline.process(&item).await })
        };

        let mut renewal = tokio::time::interval_at(
            tokio::time::Instant::now() + timing.lease_renewal,
            timing.lease_renewal,
        );
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = renewal.tick() => {
                    if let Err(e) = queue.extend(&delivery.delivery_id).await {
                        warn!(
                            worker_id,
                            delivery_id = %delivery.delivery_id,
                            error = %e,
                            "Failed to renew lease"
                        );
                    }
                }
            }
        };

        let result = match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                error!(worker_id, document_id = %item.document_id, panic = %message, "Task panicked");
                pipeline.record_panic(&item, &message).await
            }
            Err(_) => Err(DispatchError::Infrastructure("task cancelled".to_string())),
        };

        TASKS_ACTIVE.dec();

        match result {
            Ok(outcome) => {
                let label = outcome.label();
                TASKS_TOTAL.with_label_values(&[label]).inc();
                TASK_DURATION
                    .with_label_values(&[label])
                    .observe(started.elapsed().as_secs_f64());
                if let TaskOutcome::Skipped(reason) = outcome {
                    debug!(document_id = %item.document_id, reason, "Task skipped");
                }

                if let Err(e) = queue.ack(&delivery.delivery_id).await {
                    warn!(delivery_id = %delivery.delivery_id, error = %e, "Failed to ack work item");
                }
            }
            Err(e) => {
                error!(
                    worker_id,
                    document_id = %item.document_id,
                    error = %e,
                    "Task outcome not recorded; releasing for redelivery"
                );
                tokio::time::sleep(timing.failure_backoff).await;
                if let Err(e) = queue.nack(&delivery.delivery_id).await {
                    warn!(delivery_id = %delivery.delivery_id, error = %e, "Failed to nack work item");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DeliveryTiming {
    lease_renewal: Duration,
    failure_backoff: Duration,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

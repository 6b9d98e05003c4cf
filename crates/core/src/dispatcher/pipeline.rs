//! Execution of a single document task: claim, stages, terminal write, events.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::collaborators::{CollaboratorError, DocumentParser, Matcher, ObjectStorage, ProfileAnalyzer};
use crate::document::{
    record_profile_handle, Batch, Document, DocumentOutcome, DocumentStatus, DocumentStore,
};
use crate::events::ProgressPublisher;
use crate::metrics::{STAGE_DURATION, STAGE_FAILURES};
use crate::queue::WorkItem;
use crate::status::QueueStatusAggregator;

use super::types::{ActiveTask, DispatchError, Stage};

/// The external services a task talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub parser: Arc<dyn DocumentParser>,
    pub matcher: Arc<dyn Matcher>,
    pub profiles: Arc<dyn ProfileAnalyzer>,
}

/// How a task ended. Every variant is acked.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Completed,
    Failed,
    /// A newer attempt owns the document; nothing was written.
    Stale,
    /// Nothing to do (document gone or already resolved).
    Skipped(&'static str),
}

impl TaskOutcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Stale => "stale",
            TaskOutcome::Skipped(_) => "skipped",
        }
    }
}

#[derive(Default)]
pub(crate) struct Totals {
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
}

/// Shared state for running tasks. Cloned into every worker behind an `Arc`.
pub(crate) struct DocumentPipeline {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) collaborators: Collaborators,
    pub(crate) publisher: ProgressPublisher,
    pub(crate) aggregator: Arc<QueueStatusAggregator>,
    pub(crate) stage_timeout: Duration,
    pub(crate) active: RwLock<HashMap<String, ActiveTask>>,
    pub(crate) totals: Totals,
}

impl DocumentPipeline {
    /// Run one work item to a terminal state.
    ///
    /// `Err` means the outcome could not be recorded (store unavailable); the
    /// delivery should stay un-acked so it is redelivered after its lease.
    pub(crate) async fn process(&self, item: &WorkItem) -> Result<TaskOutcome, DispatchError> {
        let Some(document) = self.store.get_document(&item.document_id)? else {
            debug!(document_id = %item.document_id, "Document deleted before processing");
            return Ok(TaskOutcome::Skipped("document deleted"));
        };

        if document.attempt != item.attempt {
            info!(
                document_id = %document.id,
                task_attempt = item.attempt,
                current_attempt = document.attempt,
                "Dropping superseded work item"
            );
            return Ok(TaskOutcome::Stale);
        }

        match document.status {
            DocumentStatus::Queued | DocumentStatus::Processing => {}
            _ => {
                debug!(document_id = %document.id, status = %document.status, "Document already resolved");
                return Ok(TaskOutcome::Skipped("already resolved"));
            }
        }

        let running_here = self
            .active
            .read()
            .await
            .get(&document.id)
            .is_some_and(|task| task.attempt == item.attempt);
        if running_here {
            warn!(document_id = %document.id, attempt = item.attempt, "Attempt already running");
            return Ok(TaskOutcome::Skipped("already running"));
        }

        let document = match self.store.claim_document(&document.id, item.attempt) {
            Ok(doc) => doc,
            Err(e) => match DispatchError::from(e) {
                DispatchError::StaleAttempt { .. } => return Ok(TaskOutcome::Stale),
                other => return Err(other),
            },
        };

        let batch = self
            .store
            .get_batch(&document.batch_id)?
            .ok_or_else(|| DispatchError::NotFound {
                kind: "batch",
                id: document.batch_id.clone(),
            })?;

        self.track(&document, Stage::Downloading).await;
        let result = self.run_stages(&document, &batch).await;
        let outcome = match result {
            Ok(outcome) => self.finish_success(&document, outcome).await,
            Err((stage, err)) => self.finish_failure(&document, stage, &err).await,
        };
        self.active.write().await.remove(&document.id);
        outcome
    }

    async fn run_stages(
        &self,
        document: &Document,
        batch: &Batch,
    ) -> Result<DocumentOutcome, (Stage, DispatchError)> {
        let bytes = self
            .stage(document, Stage::Downloading, async {
                self.collaborators.storage.get(&document.storage_key).await
            })
            .await?;

        self.stage(document, Stage::Extracting, async {
            if bytes.is_empty() {
                Err(CollaboratorError::Unreadable("document is empty".to_string()))
            } else {
                Ok(())
            }
        })
        .await?;

        let mime_type = self
            .stage(document, Stage::AnalyzingStructure, async {
                resolve_mime_type(&document.mime_type, &bytes)
            })
            .await?;

        let parsed = self
            .stage(document, Stage::ParsingWithAi, async {
                self.collaborators.parser.parse(&bytes, mime_type).await
            })
            .await?;
        let mut record = parsed.record;

        let mut match_outcome = None;
        if let Some(requirement) = batch.requirement.as_deref().filter(|_| batch.has_requirement()) {
            let outcome = self
                .stage(document, Stage::MatchingJd, async {
                    self.collaborators.matcher.score(&record, requirement).await
                })
                .await?;
            match_outcome = Some(outcome);
        }

        if let Some(handle) = record_profile_handle(&record) {
            let insight = self
                .stage(document, Stage::AnalyzingGithub, async {
                    self.collaborators.profiles.analyze(&handle).await
                })
                .await?;
            if let (Value::Object(map), Ok(value)) = (&mut record, serde_json::to_value(&insight)) {
                map.insert("profile_analysis".to_string(), value);
            }
        }

        self.enter(document, Stage::Finalizing).await;
        if let Value::Object(map) = &mut record {
            map.insert(
                "token_usage".to_string(),
                json!({
                    "input_tokens": parsed.usage.input_tokens,
                    "output_tokens": parsed.usage.output_tokens,
                    "cost_usd": parsed.usage.cost_usd,
                }),
            );
        }

        Ok(DocumentOutcome {
            structured_record: record,
            match_score: match_outcome.as_ref().map(|m| m.score),
            match_rationale: match_outcome.and_then(|m| m.rationale),
        })
    }

    /// Publish the stage checkpoint, then run its work under the stage timeout.
    async fn stage<T, F>(
        &self,
        document: &Document,
        stage: Stage,
        work: F,
    ) -> Result<T, (Stage, DispatchError)>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        self.enter(document, stage).await;

        let started = Instant::now();
        let result = tokio::time::timeout(self.stage_timeout, work).await;
        STAGE_DURATION
            .with_label_values(&[stage.tag()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err((stage, stage.classify(e))),
            Err(_) => Err((
                stage,
                stage.classify(CollaboratorError::Timeout(self.stage_timeout)),
            )),
        }
    }

    async fn enter(&self, document: &Document, stage: Stage) {
        self.track(document, stage).await;
        self.publisher
            .document_progress(document, stage.percent(), stage.description(), stage.tag())
            .await;
    }

    async fn track(&self, document: &Document, stage: Stage) {
        let mut active = self.active.write().await;
        let entry = active
            .entry(document.id.clone())
            .or_insert_with(|| ActiveTask {
                document_id: document.id.clone(),
                batch_id: document.batch_id.clone(),
                attempt: document.attempt,
                stage,
                progress: stage.percent(),
                started_at: Utc::now(),
            });
        entry.stage = stage;
        entry.progress = stage.percent();
    }

    async fn finish_success(
        &self,
        document: &Document,
        outcome: DocumentOutcome,
    ) -> Result<TaskOutcome, DispatchError> {
        match self
            .store
            .complete_document(&document.id, document.attempt, outcome)
        {
            Ok(completed) => {
                info!(
                    document_id = %completed.id,
                    match_score = ?completed.match_score,
                    "Document processed"
                );
                self.totals.completed.fetch_add(1, Ordering::Relaxed);
                self.publisher.document_completed(&completed).await;
                self.publish_batch_progress(&completed.batch_id, &completed.owner_id)
                    .await;
                Ok(TaskOutcome::Completed)
            }
            Err(e) => match DispatchError::from(e) {
                DispatchError::StaleAttempt { current, .. } => {
                    warn!(
                        document_id = %document.id,
                        task_attempt = document.attempt,
                        current_attempt = current,
                        "Discarding result of superseded attempt"
                    );
                    Ok(TaskOutcome::Stale)
                }
                err => {
                    self.finish_failure(document, Stage::Finalizing, &err)
                        .await
                }
            },
        }
    }

    async fn finish_failure(
        &self,
        document: &Document,
        stage: Stage,
        err: &DispatchError,
    ) -> Result<TaskOutcome, DispatchError> {
        STAGE_FAILURES
            .with_label_values(&[stage.tag(), err.kind()])
            .inc();
        warn!(
            document_id = %document.id,
            stage = %stage,
            error = %err,
            "Document processing failed"
        );
        self.record_failure(document, &err.to_string()).await
    }

    /// Mark the document failed for this attempt and announce it.
    pub(crate) async fn record_failure(
        &self,
        document: &Document,
        message: &str,
    ) -> Result<TaskOutcome, DispatchError> {
        match self
            .store
            .fail_document(&document.id, document.attempt, message)
        {
            Ok(failed) => {
                self.totals.failed.fetch_add(1, Ordering::Relaxed);
                self.publisher.document_failed(&failed, message).await;
                self.publish_batch_progress(&failed.batch_id, &failed.owner_id)
                    .await;
                Ok(TaskOutcome::Failed)
            }
            Err(e) => match DispatchError::from(e) {
                DispatchError::StaleAttempt { .. } => Ok(TaskOutcome::Stale),
                other => {
                    error!(
                        document_id = %document.id,
                        error = %other,
                        "Failed to record document failure"
                    );
                    Err(other)
                }
            },
        }
    }

    /// Record a panic that escaped a task for `item`.
    pub(crate) async fn record_panic(
        &self,
        item: &WorkItem,
        message: &str,
    ) -> Result<TaskOutcome, DispatchError> {
        self.active.write().await.remove(&item.document_id);

        let Some(document) = self.store.get_document(&item.document_id)? else {
            return Ok(TaskOutcome::Skipped("document deleted"));
        };
        if document.attempt != item.attempt {
            return Ok(TaskOutcome::Stale);
        }
        if document.status != DocumentStatus::Processing {
            return Ok(TaskOutcome::Skipped("not processing"));
        }
        self.record_failure(&document, &format!("task panicked: {}", message))
            .await
    }

    pub(crate) async fn publish_batch_progress(&self, batch_id: &str, owner_id: &str) {
        match self.aggregator.compute(batch_id) {
            Ok(status) => self.publisher.batch_progress(owner_id, &status).await,
            Err(e) => warn!(batch_id = %batch_id, error = %e, "Failed to compute batch progress"),
        }
    }
}

/// Checks the payload against known document signatures and returns the MIME
/// type to hand to the parser.
fn resolve_mime_type(declared: &str, bytes: &[u8]) -> Result<&'static str, CollaboratorError> {
    let sniffed = sniff_mime_type(bytes).ok_or_else(|| {
        CollaboratorError::Unreadable(format!(
            "unrecognized document format (declared {})",
            declared
        ))
    })?;
    if !declared.eq_ignore_ascii_case(sniffed) {
        debug!(declared = %declared, sniffed = %sniffed, "Declared MIME type differs from content");
    }
    Ok(sniffed)
}

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Identify supported document formats by their leading bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if bytes.starts_with(b"PK\x03\x04") {
        Some(DOCX)
    } else if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        Some("application/msword")
    } else if bytes.starts_with(b"{\\rtf") {
        Some("application/rtf")
    } else if std::str::from_utf8(bytes).is_ok_and(|text| !text.contains('\0')) {
        Some("text/plain")
    } else {
        None
    }
}

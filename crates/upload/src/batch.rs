//! Multi-file uploads through one throttled queue.
//!
//! Every file gets its own [`UploadController`]; the queue bounds how many
//! run at once and re-attempts transient transfer failures. A single
//! sequential uploader is the same thing with `max_concurrent = 1`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use mocup_protocol::{ErrorCode, FileRecord, SESSION_EXPIRY_BUFFER_MS};
use mocup_transfer::{UploadFile, UploadFlow, ValidationConfig, check_upload};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::UploadApis;
use crate::clock::{Clock, SystemClock};
use crate::controller::UploadController;
use crate::error::UploadError;
use crate::queue::{QueueError, QueueStatus, RetryHooks, ThrottleConfig, ThrottledQueue};
use crate::types::{ControllerConfig, UploadCallbacks};

/// Batch configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub throttle: ThrottleConfig,
    pub validation: ValidationConfig,
    pub expiry_buffer_ms: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            validation: ValidationConfig::default(),
            expiry_buffer_ms: SESSION_EXPIRY_BUFFER_MS,
        }
    }
}

/// Where one file of the batch stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FileOutcome {
    Pending,
    Running,
    Succeeded { record: FileRecord },
    Failed { code: ErrorCode, message: String },
    Canceled,
    Expired { message: String },
    /// Rejected by validation; never reached the network.
    Rejected { code: ErrorCode, message: String },
}

impl FileOutcome {
    fn from_error(err: &UploadError) -> Self {
        match err {
            UploadError::Canceled => Self::Canceled,
            UploadError::ExpiredSession { message } => Self::Expired {
                message: message.clone(),
            },
            UploadError::Validation(_) => Self::Rejected {
                code: err.code(),
                message: err.message(),
            },
            _ => Self::Failed {
                code: err.code(),
                message: err.message(),
            },
        }
    }

    /// Still waiting or running.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Event emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress {
        id: String,
        percent: u8,
        bytes_per_second: f64,
    },
    /// A transient failure is about to be retried.
    Retrying {
        id: String,
        attempt: u32,
        error: String,
    },
    Finished {
        id: String,
        outcome: FileOutcome,
    },
}

/// Per-file view for callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub percent: u8,
    pub outcome: FileOutcome,
}

/// Summary of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
    pub expired: usize,
    pub rejected: usize,
    /// Bytes moved over bytes to move, for files that passed validation.
    pub percent: u8,
    pub is_complete: bool,
}

struct Entry {
    id: String,
    file: UploadFile,
    resource_id: String,
    controller: UploadController,
    cancel: CancellationToken,
    outcome: FileOutcome,
}

struct Job {
    id: String,
    file: UploadFile,
    resource_id: String,
    controller: UploadController,
    cancel: CancellationToken,
}

/// Uploads many files through one [`ThrottledQueue`].
pub struct BatchUploader {
    apis: UploadApis,
    clock: Arc<dyn Clock>,
    config: BatchConfig,
    queue: ThrottledQueue,
    entries: Arc<Mutex<Vec<Entry>>>,
    events_tx: mpsc::UnboundedSender<BatchEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<BatchEvent>>,
}

impl BatchUploader {
    pub fn new(apis: UploadApis, config: BatchConfig) -> Self {
        // Unbounded so a `Finished` is never lost when nobody drains during
        // `run`. Progress is only sent when the percent moves.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            apis,
            clock: Arc::new(SystemClock),
            queue: ThrottledQueue::new(config.throttle.clone()),
            config,
            entries: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Replaces the clock used by controllers created afterwards.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<BatchEvent>> {
        self.events_rx.take()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a file and returns its id. Nothing is sent until
    /// [`run`](Self::run).
    pub fn add(&self, file: UploadFile, resource_id: impl Into<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let controller = self.controller_for(&id);
        self.lock().push(Entry {
            id: id.clone(),
            file,
            resource_id: resource_id.into(),
            controller,
            cancel: CancellationToken::new(),
            outcome: FileOutcome::Pending,
        });
        id
    }

    fn controller_for(&self, id: &str) -> UploadController {
        let events = self.events_tx.clone();
        let id = id.to_string();
        let last_percent = AtomicU8::new(u8::MAX);
        let callbacks = UploadCallbacks::default().on_progress(move |sample| {
            if last_percent.swap(sample.percent, Ordering::Relaxed) == sample.percent {
                return;
            }
            let _ = events.send(BatchEvent::Progress {
                id: id.clone(),
                percent: sample.percent,
                bytes_per_second: sample.bytes_per_second,
            });
        });
        // The batch validates up front.
        let config = ControllerConfig {
            expiry_buffer_ms: self.config.expiry_buffer_ms,
            validation: None,
        };
        UploadController::new(self.apis.clone())
            .with_clock(Arc::clone(&self.clock))
            .with_config(config)
            .with_callbacks(callbacks)
    }

    /// Validates and uploads every pending file; returns once all of them
    /// settled.
    pub async fn run(&self) -> BatchReport {
        let mut rejected = Vec::new();
        let jobs: Vec<Job> = {
            let mut entries = self.lock();
            let mut jobs = Vec::new();
            for entry in entries.iter_mut() {
                if entry.outcome != FileOutcome::Pending {
                    continue;
                }
                let decision = check_upload(&entry.file, &self.config.validation);
                if let Some(issue) = decision.error {
                    warn!(file = %entry.file.name(), code = %issue.code, "file rejected");
                    entry.outcome = FileOutcome::from_error(&UploadError::Validation(issue));
                    rejected.push((entry.id.clone(), entry.outcome.clone()));
                    continue;
                }
                if decision.upload_flow == Some(UploadFlow::Direct)
                    && !self.apis.supports(UploadFlow::Direct)
                {
                    warn!(file = %entry.file.name(), size = entry.file.size(), "direct upload not available");
                    entry.outcome = FileOutcome::from_error(&UploadError::direct_flow_unavailable());
                    rejected.push((entry.id.clone(), entry.outcome.clone()));
                    continue;
                }
                entry.outcome = FileOutcome::Running;
                jobs.push(Job {
                    id: entry.id.clone(),
                    file: entry.file.clone(),
                    resource_id: entry.resource_id.clone(),
                    controller: entry.controller.clone(),
                    cancel: entry.cancel.clone(),
                });
            }
            jobs
        };
        for (id, outcome) in rejected {
            let _ = self.events_tx.send(BatchEvent::Finished { id, outcome });
        }

        info!(files = jobs.len(), max_concurrent = self.config.throttle.max_concurrent, "batch started");
        join_all(jobs.into_iter().map(|job| self.upload_one(job))).await;

        let report = self.report();
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            canceled = report.canceled,
            expired = report.expired,
            rejected = report.rejected,
            "batch finished"
        );
        report
    }

    async fn upload_one(&self, job: Job) {
        let Job {
            id,
            file,
            resource_id,
            controller,
            cancel,
        } = job;

        let task = {
            let controller = controller.clone();
            let file = file.clone();
            move || {
                let controller = controller.clone();
                let file = file.clone();
                let resource_id = resource_id.clone();
                async move {
                    // Only transient transfer failures go back to the queue.
                    match controller.try_upload(&file, &resource_id).await {
                        Ok(record) => Ok(Ok(record)),
                        Err(e) if e.is_transient() => Err(e),
                        Err(e) => Ok(Err(e)),
                    }
                }
            }
        };

        let events = self.events_tx.clone();
        let retry_id = id.clone();
        let hooks = RetryHooks::default().on_retry(move |attempt, err: &UploadError| {
            let _ = events.send(BatchEvent::Retrying {
                id: retry_id.clone(),
                attempt,
                error: err.to_string(),
            });
        });

        let outcome = match self.queue.add_to_queue(task, hooks, Some(cancel)).await {
            Ok(Ok(record)) => FileOutcome::Succeeded { record },
            Ok(Err(e)) | Err(QueueError::Task(e)) => FileOutcome::from_error(&e),
            Err(QueueError::Canceled | QueueError::Cleared) => FileOutcome::Canceled,
        };
        debug!(file = %file.name(), outcome = ?outcome, "file settled");

        if let Some(entry) = self.lock().iter_mut().find(|e| e.id == id) {
            entry.outcome = outcome.clone();
        }
        let _ = self.events_tx.send(BatchEvent::Finished { id, outcome });
    }

    /// Cancels one file. Returns `false` if the id is unknown or the file
    /// already settled.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        if !entry.outcome.is_open() {
            return false;
        }
        entry.cancel.cancel();
        entry.controller.cancel();
        if entry.outcome == FileOutcome::Pending {
            entry.outcome = FileOutcome::Canceled;
        }
        info!(file = %entry.file.name(), "file canceled");
        true
    }

    /// Cancels every open file. Returns how many were canceled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self
            .lock()
            .iter()
            .filter(|e| e.outcome.is_open())
            .map(|e| e.id.clone())
            .collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Runs failed and expired files again, each with a fresh session.
    pub async fn retry_failed(&self) -> BatchReport {
        {
            let mut entries = self.lock();
            for entry in entries.iter_mut() {
                if matches!(
                    entry.outcome,
                    FileOutcome::Failed { .. } | FileOutcome::Expired { .. }
                ) {
                    entry.outcome = FileOutcome::Pending;
                    entry.cancel = CancellationToken::new();
                }
            }
        }
        self.run().await
    }

    /// Per-file view, in insertion order.
    pub fn items(&self) -> Vec<BatchItem> {
        self.lock()
            .iter()
            .map(|e| BatchItem {
                id: e.id.clone(),
                name: e.file.name().to_string(),
                size: e.file.size(),
                percent: match e.outcome {
                    FileOutcome::Succeeded { .. } => 100,
                    FileOutcome::Pending | FileOutcome::Rejected { .. } => 0,
                    _ => e.controller.state().progress.percent,
                },
                outcome: e.outcome.clone(),
            })
            .collect()
    }

    /// Summary of the batch so far.
    pub fn report(&self) -> BatchReport {
        let entries = self.lock();
        let mut report = BatchReport {
            total: entries.len(),
            ..BatchReport::default()
        };
        let mut total_bytes: u64 = 0;
        let mut loaded_bytes: u64 = 0;

        for entry in entries.iter() {
            let size = entry.file.size();
            match &entry.outcome {
                FileOutcome::Rejected { .. } => {
                    report.rejected += 1;
                    continue;
                }
                FileOutcome::Succeeded { .. } => {
                    report.succeeded += 1;
                    loaded_bytes += size;
                }
                FileOutcome::Pending => {}
                outcome => {
                    match outcome {
                        FileOutcome::Failed { .. } => report.failed += 1,
                        FileOutcome::Canceled => report.canceled += 1,
                        FileOutcome::Expired { .. } => report.expired += 1,
                        _ => {}
                    }
                    let progress = entry.controller.state().progress;
                    loaded_bytes += progress.loaded_bytes.min(size);
                }
            }
            total_bytes += size;
        }

        report.percent = if total_bytes == 0 {
            0
        } else {
            ((loaded_bytes as f64 * 100.0 / total_bytes as f64).round() as u8).min(100)
        };
        report.is_complete = !entries.iter().any(|e| e.outcome.is_open());
        report
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.get_status()
    }
}

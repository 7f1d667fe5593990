//! Per-file upload controller.
//!
//! Drives one file through session creation, the presigned PUT and
//! completion. Each `start_upload` is an invocation; results that arrive
//! for an invocation that was canceled, reset or superseded are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mocup_protocol::{CompleteSessionRequest, CreateSessionRequest, FileRecord};
use mocup_transfer::{ProgressTracker, UploadFile, UploadFlow, UploadSession, check_upload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ProgressFn, UploadApis};
use crate::clock::{Clock, SystemClock};
use crate::error::{EXPIRED_BEFORE_TRANSFER_MESSAGE, UploadError};
use crate::state::{UploadEvent, UploadStatus, next_status};
use crate::types::{ControllerConfig, ControllerState, LastError, UploadCallbacks};

#[derive(Default)]
struct Inner {
    status: UploadStatus,
    invocation: u64,
    cancel: Option<CancellationToken>,
    file: Option<(String, u64)>,
    session: Option<UploadSession>,
    tracker: ProgressTracker,
    error: Option<LastError>,
    record: Option<FileRecord>,
}

impl Inner {
    /// Applies `event` if `invocation` is still current and the transition
    /// is legal. Returns the new status.
    fn transition(&mut self, invocation: u64, event: UploadEvent) -> Option<UploadStatus> {
        if self.invocation != invocation {
            return None;
        }
        let next = next_status(self.status, event)?;
        self.status = next;
        Some(next)
    }
}

/// Drives one file at a time through the presigned upload flow.
///
/// Cloning yields another handle to the same controller, so one task can
/// run [`start_upload`](Self::start_upload) while another calls
/// [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct UploadController {
    inner: Arc<Mutex<Inner>>,
    apis: UploadApis,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    callbacks: Arc<UploadCallbacks>,
}

impl UploadController {
    pub fn new(apis: UploadApis) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            apis,
            clock: Arc::new(SystemClock),
            config: ControllerConfig::default(),
            callbacks: Arc::new(UploadCallbacks::default()),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uploads `file` to `resource_id`.
    ///
    /// Never fails: on any failure the error is recorded in the observable
    /// state, the matching callback fires and `None` is returned.
    pub async fn start_upload(&self, file: &UploadFile, resource_id: &str) -> Option<FileRecord> {
        self.try_upload(file, resource_id).await.ok()
    }

    /// Same as [`start_upload`](Self::start_upload), with a fresh session.
    /// Validation runs again.
    pub async fn retry(&self, file: &UploadFile, resource_id: &str) -> Option<FileRecord> {
        debug!(file = %file.name(), "retrying upload");
        self.start_upload(file, resource_id).await
    }

    /// Like [`start_upload`](Self::start_upload) but returns the error.
    pub async fn try_upload(
        &self,
        file: &UploadFile,
        resource_id: &str,
    ) -> Result<FileRecord, UploadError> {
        let flow = match &self.config.validation {
            Some(validation) => {
                let decision = check_upload(file, validation);
                if let Some(issue) = decision.error {
                    warn!(file = %file.name(), code = %issue.code, "file rejected before upload");
                    return Err(UploadError::Validation(issue));
                }
                decision
                    .upload_flow
                    .unwrap_or_else(|| UploadFlow::for_size(file.size()))
            }
            None => UploadFlow::for_size(file.size()),
        };
        if !self.apis.supports(flow) {
            warn!(file = %file.name(), size = file.size(), "direct upload not available");
            return Err(UploadError::direct_flow_unavailable());
        }

        let (invocation, cancel) = self.begin(file);
        info!(
            file = %file.name(),
            size = file.size(),
            resource = %resource_id,
            flow = ?flow,
            "starting upload"
        );

        let result = match flow {
            UploadFlow::Presigned => self.run(invocation, &cancel, file, resource_id).await,
            UploadFlow::Direct => self.run_direct(invocation, &cancel, file, resource_id).await,
        };
        self.finish(invocation, result)
    }

    /// Aborts the in-flight invocation. No-op when idle or already terminal.
    pub fn cancel(&self) {
        let token = {
            let mut inner = self.lock();
            let invocation = inner.invocation;
            if inner.transition(invocation, UploadEvent::Cancel).is_none() {
                return;
            }
            inner.error = Some(LastError::from(&UploadError::Canceled));
            inner.cancel.take()
        };
        if let Some(token) = token {
            token.cancel();
        }
        info!("upload canceled");
    }

    /// Aborts anything in flight and returns to `idle`, discarding session,
    /// progress and error.
    pub fn reset(&self) {
        let token = {
            let mut inner = self.lock();
            let token = inner.cancel.take();
            let invocation = inner.invocation + 1;
            *inner = Inner {
                invocation,
                ..Inner::default()
            };
            if let Some(status) = next_status(inner.status, UploadEvent::Reset) {
                inner.status = status;
            }
            token
        };
        if let Some(token) = token {
            token.cancel();
        }
        debug!("controller reset");
    }

    /// `true` iff a session is bound and `now >= expires_at - buffer`.
    pub fn is_session_expired(&self) -> bool {
        let now = self.clock.now_ms();
        self.lock()
            .session
            .as_ref()
            .is_some_and(|s| s.is_expired(now, self.config.expiry_buffer_ms))
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> ControllerState {
        let now = self.clock.now_ms();
        let inner = self.lock();
        let (file_name, file_size) = match &inner.file {
            Some((name, size)) => (Some(name.clone()), *size),
            None => (None, 0),
        };
        ControllerState {
            status: inner.status,
            file_name,
            file_size,
            progress: inner.tracker.last().clone(),
            session_id: inner.session.as_ref().map(|s| s.session_id().to_string()),
            expires_at_ms: inner.session.as_ref().map(UploadSession::expires_at_ms),
            time_remaining_ms: inner.session.as_ref().map(|s| s.time_remaining_ms(now)),
            error: inner.error.clone(),
            file_record: inner.record.clone(),
        }
    }

    /// Opens a new invocation, superseding any previous one.
    fn begin(&self, file: &UploadFile) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut inner = self.lock();
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }
        inner.invocation += 1;
        if let Some(status) = next_status(inner.status, UploadEvent::Start) {
            inner.status = status;
        }
        inner.file = Some((file.name().to_string(), file.size()));
        inner.session = None;
        inner.error = None;
        inner.record = None;
        inner.tracker.reset();
        inner.cancel = Some(token.clone());
        (inner.invocation, token)
    }

    async fn run(
        &self,
        invocation: u64,
        cancel: &CancellationToken,
        file: &UploadFile,
        resource_id: &str,
    ) -> Result<FileRecord, UploadError> {
        // 1. Session
        let request = CreateSessionRequest {
            filename: file.name().to_string(),
            file_size: file.size(),
            file_type: file.content_type_or_default().to_string(),
        };
        let response = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Canceled),
            r = self.apis.sessions.create_session(resource_id, &request) => {
                r.map_err(UploadError::from_session_failure)
            }
        }?;

        let session = UploadSession::from_response(&response, resource_id);
        let now = self.clock.now_ms();
        let expired = session.is_expired(now, self.config.expiry_buffer_ms);
        {
            let mut inner = self.lock();
            if inner.invocation != invocation {
                return Err(UploadError::Canceled);
            }
            inner.session = Some(session.clone());
            if expired {
                warn!(
                    session = %session.session_id(),
                    remaining_ms = session.time_remaining_ms(now),
                    "session issued inside expiry buffer"
                );
                return Err(UploadError::ExpiredSession {
                    message: EXPIRED_BEFORE_TRANSFER_MESSAGE.to_string(),
                });
            }
            if inner.transition(invocation, UploadEvent::SessionIssued).is_none() {
                return Err(UploadError::Canceled);
            }
            inner.tracker.start(now);
        }
        debug!(session = %session.session_id(), expires_at_ms = session.expires_at_ms(), "session issued");

        // 2. Transfer
        let progress = self.progress_fn(invocation);
        let put = self.apis.storage.put_object(
            session.presigned_url(),
            file,
            progress,
            cancel.clone(),
        );
        let transferred = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Canceled),
            r = put => r.map_err(UploadError::from_transport_failure),
        };
        transferred?;

        let sample = {
            let mut inner = self.lock();
            if inner.transition(invocation, UploadEvent::TransferDone).is_none() {
                return Err(UploadError::Canceled);
            }
            inner.tracker.finalize(file.size()).clone()
        };
        if let Some(cb) = &self.callbacks.on_progress {
            cb(&sample);
        }
        debug!(session = %session.session_id(), "transfer done, completing");

        // 3. Completion
        let request = CompleteSessionRequest {
            resource_id: resource_id.to_string(),
            session_id: session.session_id().to_string(),
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Canceled),
            r = self.apis.completion.complete_session(&request) => {
                r.map_err(UploadError::from_session_failure)
            }
        }
    }

    /// Single-request flow for files at or below the direct ceiling.
    async fn run_direct(
        &self,
        invocation: u64,
        cancel: &CancellationToken,
        file: &UploadFile,
        resource_id: &str,
    ) -> Result<FileRecord, UploadError> {
        let Some(direct) = self.apis.direct.clone() else {
            return Err(UploadError::direct_flow_unavailable());
        };
        let now = self.clock.now_ms();
        {
            let mut inner = self.lock();
            if inner.transition(invocation, UploadEvent::DirectUpload).is_none() {
                return Err(UploadError::Canceled);
            }
            inner.tracker.start(now);
        }
        debug!(file = %file.name(), "uploading directly");

        let progress = self.progress_fn(invocation);
        let upload = direct.upload_direct(resource_id, file, progress, cancel.clone());
        let record = tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Canceled),
            r = upload => r.map_err(UploadError::from_transport_failure),
        }?;

        let sample = {
            let mut inner = self.lock();
            if inner.transition(invocation, UploadEvent::TransferDone).is_none() {
                return Err(UploadError::Canceled);
            }
            inner.tracker.finalize(file.size()).clone()
        };
        if let Some(cb) = &self.callbacks.on_progress {
            cb(&sample);
        }
        Ok(record)
    }

    /// Progress callback bound to one invocation.
    fn progress_fn(&self, invocation: u64) -> ProgressFn {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let callbacks = Arc::clone(&self.callbacks);
        Arc::new(move |loaded, total| {
            let sample = {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.transition(invocation, UploadEvent::Progress).is_none() {
                    return;
                }
                inner.tracker.record(loaded, total, clock.now_ms()).clone()
            };
            if let Some(cb) = &callbacks.on_progress {
                cb(&sample);
            }
        })
    }

    /// Records the outcome of `invocation` and fires callbacks. Outcomes of
    /// stale invocations, or arriving after a cancel, leave state untouched.
    fn finish(
        &self,
        invocation: u64,
        result: Result<FileRecord, UploadError>,
    ) -> Result<FileRecord, UploadError> {
        let event = match &result {
            Ok(_) => UploadEvent::Completed,
            Err(UploadError::Canceled) => UploadEvent::Cancel,
            Err(UploadError::ExpiredSession { .. }) => UploadEvent::Expire,
            Err(_) => UploadEvent::Failed,
        };

        {
            let mut inner = self.lock();
            if inner.transition(invocation, event).is_none() {
                debug!(invocation, "discarding outcome of finished invocation");
                return Err(UploadError::Canceled);
            }
            inner.cancel = None;
            match &result {
                Ok(record) => inner.record = Some(record.clone()),
                Err(err) => inner.error = Some(LastError::from(err)),
            }
        }

        match &result {
            Ok(record) => {
                info!(file = %record.original_filename, id = %record.id, "upload completed");
                if let Some(cb) = &self.callbacks.on_success {
                    cb(record);
                }
            }
            Err(UploadError::Canceled) => info!("upload canceled"),
            Err(err @ UploadError::ExpiredSession { .. }) => {
                warn!(error = %err, "upload session expired");
                if let Some(cb) = &self.callbacks.on_session_expired {
                    cb();
                }
            }
            Err(err) => {
                error!(error = %err, code = %err.code(), "upload failed");
                if let Some(cb) = &self.callbacks.on_error {
                    cb(err);
                }
            }
        }
        result
    }
}

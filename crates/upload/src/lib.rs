//! Presigned upload flow: per-file controller, throttled retry queue and
//! batch uploads.
//!
//! This crate holds the **orchestration logic** only. It talks to the
//! outside world through the [`SessionApi`], [`StorageApi`] and
//! [`CompletionApi`] traits; `mocup-http` provides the HTTP implementations
//! and tests provide mocks.
//!
//! # Flow
//!
//! 1. **Validate**: reject bad files before any network call
//! 2. **Session**: obtain a presigned URL and its expiry
//! 3. **Transfer**: PUT the bytes, reporting progress, cancellable
//! 4. **Complete**: turn the session into a file record

pub mod api;
pub mod batch;
pub mod clock;
pub mod controller;
pub mod error;
pub mod queue;
pub mod state;
pub mod types;

// Re-export primary types for convenience.
pub use api::{
    ApiFailure, BoxFuture, CompletionApi, DirectUploadApi, ProgressFn, SessionApi, StorageApi,
    UploadApis,
};
pub use batch::{BatchConfig, BatchEvent, BatchItem, BatchReport, BatchUploader, FileOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::UploadController;
pub use error::{CANCELED_MESSAGE, DIRECT_FLOW_UNAVAILABLE_MESSAGE, ErrorKind, UploadError};
pub use queue::{
    AttemptInfo, QueueError, QueueStatus, RetryHooks, ThrottleConfig, ThrottledQueue,
};
pub use state::{UploadEvent, UploadStatus, next_status};
pub use types::{ControllerConfig, ControllerState, LastError, UploadCallbacks};

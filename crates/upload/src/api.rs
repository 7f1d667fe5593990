//! Seams to the three endpoints of a presigned upload.
//!
//! The controller only talks to these traits. `mocup-http` implements them
//! over HTTP; tests implement them with scripted mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mocup_protocol::{
    ApiErrorBody, CompleteSessionRequest, CreateSessionRequest, CreateSessionResponse, ErrorCode,
    FileRecord,
};
use mocup_transfer::{UploadFile, UploadFlow};
use tokio_util::sync::CancellationToken;

/// Boxed future returned by the seam traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transfer progress callback: `(loaded_bytes, total_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A failed call to one of the endpoints, as a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiFailure {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub http_status: Option<u16>,
}

impl ApiFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Connection-level failure with no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Builds a failure from an error response. A parseable error payload
    /// wins over the status-derived code.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        match ApiErrorBody::parse(body) {
            Some(payload) => {
                let message = if payload.message.is_empty() {
                    format!("Request failed with status {status}")
                } else {
                    payload.message
                };
                Self::new(payload.error, message).with_status(status)
            }
            None => Self::new(
                ErrorCode::from_http_status(status),
                format!("Request failed with status {status}"),
            )
            .with_status(status),
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// With a status: 408, 429 and 5xx. Without one: network errors,
    /// timeouts, rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self.http_status {
            Some(408 | 429 | 500..=599) => true,
            Some(_) => false,
            None => matches!(
                self.code,
                ErrorCode::NetworkError
                    | ErrorCode::Timeout
                    | ErrorCode::RateLimited
                    | ErrorCode::ServerError
            ),
        }
    }
}

/// Session API: issues presigned upload sessions.
pub trait SessionApi: Send + Sync {
    fn create_session<'a>(
        &'a self,
        resource_id: &'a str,
        request: &'a CreateSessionRequest,
    ) -> BoxFuture<'a, Result<CreateSessionResponse, ApiFailure>>;
}

/// Storage API: receives the raw bytes at the presigned URL.
///
/// Implementations report progress through `progress` and must stop
/// promptly once `cancel` fires.
pub trait StorageApi: Send + Sync {
    fn put_object<'a>(
        &'a self,
        url: &'a str,
        file: &'a UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), ApiFailure>>;
}

/// Completion API: finalizes a session into a file record.
pub trait CompletionApi: Send + Sync {
    fn complete_session<'a>(
        &'a self,
        request: &'a CompleteSessionRequest,
    ) -> BoxFuture<'a, Result<FileRecord, ApiFailure>>;
}

/// Direct upload: small files go to the API in one request and come back
/// as a file record, with no session.
pub trait DirectUploadApi: Send + Sync {
    fn upload_direct<'a>(
        &'a self,
        resource_id: &'a str,
        file: &'a UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<FileRecord, ApiFailure>>;
}

/// The seams a controller needs, shared between controllers.
///
/// Without a direct seam, files small enough for the direct flow are
/// rejected before any network call.
#[derive(Clone)]
pub struct UploadApis {
    pub sessions: Arc<dyn SessionApi>,
    pub storage: Arc<dyn StorageApi>,
    pub completion: Arc<dyn CompletionApi>,
    pub direct: Option<Arc<dyn DirectUploadApi>>,
}

impl UploadApis {
    pub fn new(
        sessions: Arc<dyn SessionApi>,
        storage: Arc<dyn StorageApi>,
        completion: Arc<dyn CompletionApi>,
    ) -> Self {
        Self {
            sessions,
            storage,
            completion,
            direct: None,
        }
    }

    pub fn with_direct(mut self, direct: Arc<dyn DirectUploadApi>) -> Self {
        self.direct = Some(direct);
        self
    }

    /// Whether files routed to `flow` can be uploaded.
    pub fn supports(&self, flow: UploadFlow) -> bool {
        match flow {
            UploadFlow::Presigned => true,
            UploadFlow::Direct => self.direct.is_some(),
        }
    }
}

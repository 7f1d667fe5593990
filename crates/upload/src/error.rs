//! Upload error taxonomy.

use mocup_protocol::ErrorCode;
use mocup_transfer::{ValidationCode, ValidationIssue};

use crate::api::ApiFailure;

/// Message recorded when the user cancels an upload.
pub const CANCELED_MESSAGE: &str = "Upload canceled";

/// Message recorded when a freshly issued session is already inside the
/// expiry buffer.
pub const EXPIRED_BEFORE_TRANSFER_MESSAGE: &str =
    "Upload session expired before the transfer could start";

/// Message recorded when a file needs the direct flow and no direct seam
/// is configured.
pub const DIRECT_FLOW_UNAVAILABLE_MESSAGE: &str =
    "File is too small for a presigned upload and direct upload is not available.";

/// Coarse failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Session,
    Transport,
    ExpiredSession,
    Canceled,
}

/// Errors produced by an upload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    /// Rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(ValidationIssue),

    /// Session creation or completion failed.
    #[error("session error: {0}")]
    Session(ApiFailure),

    /// The byte transfer failed.
    #[error("transfer error: {0}")]
    Transport(ApiFailure),

    #[error("session expired: {message}")]
    ExpiredSession { message: String },

    #[error("Upload canceled")]
    Canceled,
}

impl UploadError {
    /// Rejection for a direct-flow file when only the presigned flow is
    /// available. Reported as `FILE_TOO_SMALL`, the code the session API
    /// would answer with.
    pub fn direct_flow_unavailable() -> Self {
        Self::Validation(ValidationIssue {
            code: ValidationCode::FileTooSmall,
            message: DIRECT_FLOW_UNAVAILABLE_MESSAGE.to_string(),
        })
    }

    /// Classifies a session or completion API failure.
    pub fn from_session_failure(failure: ApiFailure) -> Self {
        if failure.code.is_expiry() {
            Self::ExpiredSession {
                message: failure.message,
            }
        } else {
            Self::Session(failure)
        }
    }

    /// Classifies a storage failure.
    pub fn from_transport_failure(failure: ApiFailure) -> Self {
        match failure.code {
            ErrorCode::ExpiredSession => Self::ExpiredSession {
                message: failure.message,
            },
            ErrorCode::Canceled => Self::Canceled,
            _ => Self::Transport(failure),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Session(_) => ErrorKind::Session,
            Self::Transport(_) => ErrorKind::Transport,
            Self::ExpiredSession { .. } => ErrorKind::ExpiredSession,
            Self::Canceled => ErrorKind::Canceled,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(issue) => issue.code.error_code(),
            Self::Session(f) | Self::Transport(f) => f.code.clone(),
            Self::ExpiredSession { .. } => ErrorCode::ExpiredSession,
            Self::Canceled => ErrorCode::Canceled,
        }
    }

    /// User-facing message.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(issue) => issue.message.clone(),
            Self::Session(f) | Self::Transport(f) => f.message.clone(),
            Self::ExpiredSession { message } => message.clone(),
            Self::Canceled => CANCELED_MESSAGE.to_string(),
        }
    }

    /// Only transport failures are retried automatically, and only when the
    /// failure itself is transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(f) => f.is_transient(),
            _ => false,
        }
    }
}

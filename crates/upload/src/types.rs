//! Data types for the upload flow.

use mocup_protocol::{ErrorCode, FileRecord, SESSION_EXPIRY_BUFFER_MS};
use mocup_transfer::{ProgressSample, ValidationConfig};
use serde::Serialize;

use crate::error::UploadError;
use crate::state::UploadStatus;

pub type SuccessCallback = Box<dyn Fn(&FileRecord) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&UploadError) + Send + Sync>;
pub type ExpiredCallback = Box<dyn Fn() + Send + Sync>;
pub type ProgressCallback = Box<dyn Fn(&ProgressSample) + Send + Sync>;

/// Notifications from an [`UploadController`](crate::UploadController).
///
/// Expiry and error are separate so the caller can offer "refresh and
/// retry" instead of a plain failure. Cancellation fires neither.
#[derive(Default)]
pub struct UploadCallbacks {
    /// Once per successful invocation, with the created record.
    pub on_success: Option<SuccessCallback>,
    /// Once per failed invocation, except for expiry and cancellation.
    pub on_error: Option<ErrorCallback>,
    /// Once per invocation that ends in `expired`.
    pub on_session_expired: Option<ExpiredCallback>,
    /// On every transfer progress event, in transport order.
    pub on_progress: Option<ProgressCallback>,
}

impl UploadCallbacks {
    pub fn on_success(mut self, f: impl Fn(&FileRecord) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&UploadError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_session_expired(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(&ProgressSample) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_session_expired", &self.on_session_expired.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Margin subtracted from a session's expiry.
    pub expiry_buffer_ms: i64,
    /// Pre-flight gate. `None` skips validation.
    pub validation: Option<ValidationConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_ms: SESSION_EXPIRY_BUFFER_MS,
            validation: Some(ValidationConfig::default()),
        }
    }
}

/// Last error recorded on a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub message: String,
    pub code: ErrorCode,
}

impl From<&UploadError> for LastError {
    fn from(err: &UploadError) -> Self {
        Self {
            message: err.message(),
            code: err.code(),
        }
    }
}

/// Snapshot of a controller's observable state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: u64,
    pub progress: ProgressSample,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
    /// Milliseconds until the session's hard expiry, floored at zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LastError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_record: Option<FileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_shared_buffer() {
        let config = ControllerConfig::default();
        assert_eq!(config.expiry_buffer_ms, 30_000);
        assert!(config.validation.is_some());
    }

    #[test]
    fn callbacks_debug_shows_presence() {
        let callbacks = UploadCallbacks::default().on_session_expired(|| {});
        let dbg = format!("{callbacks:?}");
        assert!(dbg.contains("on_session_expired: true"));
        assert!(dbg.contains("on_error: false"));
    }

    #[test]
    fn last_error_from_upload_error() {
        let last = LastError::from(&UploadError::Canceled);
        assert_eq!(last.message, "Upload canceled");
        assert_eq!(last.code, ErrorCode::Canceled);
    }
}

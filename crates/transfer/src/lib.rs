//! File handles, pre-flight validation and progress tracking for presigned
//! uploads.
//!
//! Nothing in this crate performs network I/O; it is the pure half of the
//! upload pipeline.

mod checksum;
mod progress;
mod sanitize;
mod types;
mod validation;

pub use checksum::{checksum_base64, file_checksum_base64};
pub use progress::{ProgressSample, ProgressTracker, format_file_size, format_speed};
pub use sanitize::{SanitizeOptions, SanitizedName, extract_extension, sanitize_filename};
pub use types::{FileSource, UploadFile, UploadSession};
pub use validation::{
    AllowedType, FlowDecision, UploadFlow, ValidationCode, ValidationConfig, ValidationIssue,
    ValidationReport, check_upload, validate_file, validate_files,
};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {0}")]
    NotAFile(String),
}

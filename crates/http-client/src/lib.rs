//! HTTP implementations of the upload seams.
//!
//! [`HttpSessionClient`] speaks JSON to the session API (create and
//! complete) and posts small files as multipart forms;
//! [`HttpStorageClient`] streams raw bytes to a presigned URL.

mod body;
mod config;
mod session;
mod storage;

#[cfg(test)]
mod test_server;

pub use config::HttpConfig;
pub use session::HttpSessionClient;
pub use storage::{CHECKSUM_HEADER, HttpStorageClient};

use std::sync::Arc;

use mocup_protocol::ErrorCode;
use mocup_upload::{ApiFailure, UploadApis};

/// Errors building an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid bearer token")]
    InvalidToken,
}

/// Builds every seam, direct upload included, from one configuration.
pub fn upload_apis(config: &HttpConfig) -> Result<UploadApis, Error> {
    let sessions = Arc::new(HttpSessionClient::new(config)?);
    let storage = Arc::new(HttpStorageClient::new(config)?);
    Ok(UploadApis::new(sessions.clone(), storage, sessions.clone()).with_direct(sessions))
}

/// Maps a request that produced no response to a failure value.
pub(crate) fn request_failure(err: &reqwest::Error) -> ApiFailure {
    if err.is_timeout() {
        ApiFailure::new(ErrorCode::Timeout, format!("Request timed out: {err}"))
    } else {
        ApiFailure::network(format!("Network error: {err}"))
    }
}

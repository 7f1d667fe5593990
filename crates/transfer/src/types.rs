use std::path::{Path, PathBuf};
use std::sync::Arc;

use mocup_protocol::constants::DEFAULT_CONTENT_TYPE;

use crate::TransferError;
use crate::validation::mime_for_extension;

/// Where the bytes of an [`UploadFile`] live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Bytes already held in memory.
    Memory(Arc<[u8]>),
    /// A file on disk, read lazily by the transport.
    Path(PathBuf),
}

/// A byte-bearing file handle with the metadata the upload flow needs.
///
/// Cloning is cheap: in-memory bytes are shared.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    size: u64,
    content_type: String,
    source: FileSource,
}

impl UploadFile {
    /// Creates a handle over in-memory bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            content_type: content_type.into(),
            source: FileSource::Memory(data),
        }
    }

    /// Creates a handle over a file on disk.
    ///
    /// The content type is guessed from the extension; unknown extensions
    /// get an empty type so validation can flag them.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = crate::sanitize::extract_extension(&name)
            .and_then(|ext| mime_for_extension(&ext))
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            name,
            size: meta.len(),
            content_type,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Overrides the declared size (useful for sources whose length is
    /// known out of band).
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// File name as the user chose it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared MIME type (may be empty).
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Declared MIME type, or `application/octet-stream` if none.
    pub fn content_type_or_default(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    /// Where the bytes live.
    pub fn source(&self) -> &FileSource {
        &self.source
    }
}

/// A server-issued upload session.
///
/// Immutable once issued: the expiry never moves after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    session_id: String,
    presigned_url: String,
    expires_at_ms: i64,
    resource_id: String,
}

impl UploadSession {
    pub fn new(
        session_id: impl Into<String>,
        presigned_url: impl Into<String>,
        expires_at_ms: i64,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            presigned_url: presigned_url.into(),
            expires_at_ms,
            resource_id: resource_id.into(),
        }
    }

    /// Builds a session from the create-session response.
    pub fn from_response(
        resp: &mocup_protocol::CreateSessionResponse,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::new(
            resp.session_id.clone(),
            resp.presigned_url.clone(),
            resp.expires_at_ms(),
            resource_id,
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn presigned_url(&self) -> &str {
        &self.presigned_url
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Returns `true` iff `now_ms >= expires_at - buffer_ms`.
    pub fn is_expired(&self, now_ms: i64, buffer_ms: i64) -> bool {
        now_ms >= self.expires_at_ms.saturating_sub(buffer_ms)
    }

    /// Milliseconds until the hard expiry, floored at zero.
    pub fn time_remaining_ms(&self, now_ms: i64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms).max(0) as u64
    }
}

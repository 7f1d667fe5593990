use std::time::Duration;

/// Safety margin subtracted from a session's expiry.
///
/// A session is treated as expired this long before the server's deadline
/// so a transfer never starts on a URL that lapses mid-flight. The server
/// applies the same margin when completing a session.
pub const SESSION_EXPIRY_BUFFER_MS: i64 = 30_000;

/// [`SESSION_EXPIRY_BUFFER_MS`] as a [`Duration`].
pub const SESSION_EXPIRY_BUFFER: Duration = Duration::from_millis(SESSION_EXPIRY_BUFFER_MS as u64);

/// Smallest file accepted by any flow (1 byte).
pub const MIN_FILE_SIZE: u64 = 1;

/// Files up to this size go through the direct (non-presigned) flow (10 MB).
///
/// The session API rejects anything at or below it with `FILE_TOO_SMALL`.
pub const MAX_DIRECT_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// Ceiling of the presigned flow (50 MB). Larger files are rejected outright.
pub const MAX_PRESIGNED_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Content type sent when the file declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

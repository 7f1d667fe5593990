//! Wire types shared by the upload client and the session API.
//!
//! Covers the three endpoints that bound a presigned upload: session
//! creation, the raw byte transfer, and session completion.

pub mod codes;
pub mod constants;
pub mod types;

// Re-export primary types for convenience.
pub use codes::ErrorCode;
pub use constants::SESSION_EXPIRY_BUFFER_MS;
pub use types::{
    ApiErrorBody, CompleteSessionRequest, CreateSessionRequest, CreateSessionResponse,
    FileRecord,
};

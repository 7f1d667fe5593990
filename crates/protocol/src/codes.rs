use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Machine-readable error code carried by API error payloads and by the
/// client's own failure records.
///
/// Unrecognised codes are preserved verbatim in [`ErrorCode::Other`] so a
/// server-side addition never turns into a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    ValidationError,
    FileTooSmall,
    FileTooLarge,
    InvalidMimeType,
    SessionNotFound,
    ExpiredSession,
    Forbidden,
    Unauthorized,
    Canceled,
    NetworkError,
    Timeout,
    RateLimited,
    S3Error,
    ServerError,
    PayloadTooLarge,
    Unknown,
    Other(String),
}

impl ErrorCode {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::FileTooSmall => "FILE_TOO_SMALL",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::InvalidMimeType => "INVALID_MIME_TYPE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ExpiredSession => "EXPIRED_SESSION",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Canceled => "CANCELED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::S3Error => "S3_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Unknown => "UNKNOWN",
            Self::Other(code) => code,
        }
    }

    /// Maps an HTTP status to the closest code.
    ///
    /// 404 maps to `SESSION_NOT_FOUND` because the only resources the upload
    /// client addresses by id are sessions.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::SessionNotFound,
            408 => Self::Timeout,
            410 => Self::ExpiredSession,
            413 => Self::PayloadTooLarge,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` for the session-expiry code.
    pub fn is_expiry(&self) -> bool {
        matches!(self, Self::ExpiredSession)
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "VALIDATION_ERROR" => Self::ValidationError,
            "FILE_TOO_SMALL" => Self::FileTooSmall,
            "FILE_TOO_LARGE" => Self::FileTooLarge,
            "INVALID_MIME_TYPE" => Self::InvalidMimeType,
            "SESSION_NOT_FOUND" => Self::SessionNotFound,
            "EXPIRED_SESSION" => Self::ExpiredSession,
            "FORBIDDEN" => Self::Forbidden,
            "UNAUTHORIZED" => Self::Unauthorized,
            "CANCELED" => Self::Canceled,
            "NETWORK_ERROR" => Self::NetworkError,
            "TIMEOUT" => Self::Timeout,
            "RATE_LIMITED" => Self::RateLimited,
            "S3_ERROR" => Self::S3Error,
            "SERVER_ERROR" => Self::ServerError,
            "PAYLOAD_TOO_LARGE" => Self::PayloadTooLarge,
            "UNKNOWN" | "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_serialize_as_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::ExpiredSession).unwrap(),
            "\"EXPIRED_SESSION\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::FileTooSmall).unwrap(),
            "\"FILE_TOO_SMALL\""
        );
    }

    #[test]
    fn unknown_codes_are_preserved() {
        let code: ErrorCode = serde_json::from_str("\"COMPLETION_FAILED\"").unwrap();
        assert_eq!(code, ErrorCode::Other("COMPLETION_FAILED".into()));
        assert_eq!(code.to_string(), "COMPLETION_FAILED");
    }

    #[test]
    fn empty_code_is_unknown() {
        let code: ErrorCode = "".parse().unwrap();
        assert_eq!(code, ErrorCode::Unknown);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::from_http_status(401), ErrorCode::Unauthorized);
        assert_eq!(ErrorCode::from_http_status(403), ErrorCode::Forbidden);
        assert_eq!(ErrorCode::from_http_status(404), ErrorCode::SessionNotFound);
        assert_eq!(ErrorCode::from_http_status(410), ErrorCode::ExpiredSession);
        assert_eq!(ErrorCode::from_http_status(429), ErrorCode::RateLimited);
        assert_eq!(ErrorCode::from_http_status(503), ErrorCode::ServerError);
        assert_eq!(ErrorCode::from_http_status(418), ErrorCode::Unknown);
    }

    #[test]
    fn expiry_predicate() {
        assert!(ErrorCode::ExpiredSession.is_expiry());
        assert!(!ErrorCode::SessionNotFound.is_expiry());
    }
}

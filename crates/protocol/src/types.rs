use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::ErrorCode;

/// Body of `POST /mocs/{resourceId}/upload-sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub filename: String,
    pub file_size: u64,
    pub file_type: String,
}

/// Successful response to session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub presigned_url: String,
    /// ISO-8601 instant after which the presigned URL stops working.
    pub expires_at: DateTime<Utc>,
}

impl CreateSessionResponse {
    /// Expiry as milliseconds since the Unix epoch.
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// Body of `POST /mocs/{resourceId}/upload-sessions/{sessionId}/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    pub resource_id: String,
    pub session_id: String,
}

/// File record created by a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    #[serde(alias = "mocId")]
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
    #[serde(alias = "downloadUrl")]
    pub file_url: String,
    #[serde(alias = "filename", alias = "name")]
    pub original_filename: String,
    #[serde(alias = "contentType")]
    pub mime_type: String,
    #[serde(alias = "size")]
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uploaded_by: String,
}

/// Error payload returned by the session and completion endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ErrorCode,
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    /// Parses an error payload, returning `None` for bodies that are not
    /// shaped like one (HTML error pages, empty bodies, ...).
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_field_names() {
        let req = CreateSessionRequest {
            filename: "castle.pdf".into(),
            file_size: 15_000_000,
            file_type: "application/pdf".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"filename":"castle.pdf","fileSize":15000000,"fileType":"application/pdf"}"#
        );
    }

    #[test]
    fn create_response_parses_iso_expiry() {
        let json = r#"{"sessionId":"s-1","presignedUrl":"https://bucket/key?sig=1","expiresAt":"2025-01-01T00:15:00Z"}"#;
        let resp: CreateSessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session_id, "s-1");
        assert_eq!(resp.expires_at_ms(), 1_735_690_500_000);
    }

    #[test]
    fn create_response_rejects_bad_expiry() {
        let json = r#"{"sessionId":"s-1","presignedUrl":"u","expiresAt":"soon"}"#;
        assert!(serde_json::from_str::<CreateSessionResponse>(json).is_err());
    }

    #[test]
    fn file_record_accepts_legacy_field_names() {
        let json = r#"{
            "id": "file-123",
            "mocId": "moc-1",
            "downloadUrl": "https://cdn/file.pdf",
            "filename": "instructions.pdf",
            "contentType": "application/pdf",
            "fileSize": 15000000
        }"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.resource_id, "moc-1");
        assert_eq!(record.file_url, "https://cdn/file.pdf");
        assert_eq!(record.original_filename, "instructions.pdf");
        assert!(record.created_at.is_none());
    }

    #[test]
    fn file_record_omits_empty_optionals() {
        let record = FileRecord {
            id: "f".into(),
            resource_id: "r".into(),
            file_type: String::new(),
            file_url: "u".into(),
            original_filename: "a.pdf".into(),
            mime_type: "application/pdf".into(),
            file_size: 1,
            created_at: None,
            uploaded_by: String::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("fileType"));
        assert!(!json.contains("createdAt"));
        assert!(!json.contains("uploadedBy"));
    }

    #[test]
    fn error_body_parse() {
        let body = br#"{"error":"EXPIRED_SESSION","message":"Session has expired"}"#;
        let parsed = ApiErrorBody::parse(body).unwrap();
        assert_eq!(parsed.error, ErrorCode::ExpiredSession);
        assert_eq!(parsed.message, "Session has expired");

        assert!(ApiErrorBody::parse(b"<html>bad gateway</html>").is_none());
    }
}

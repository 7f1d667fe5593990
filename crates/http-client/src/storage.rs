//! Streamed PUT of raw bytes to a presigned object-store URL.

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mocup_protocol::ErrorCode;
use mocup_transfer::{FileSource, UploadFile, checksum_base64, file_checksum_base64};
use mocup_upload::{ApiFailure, BoxFuture, CANCELED_MESSAGE, ProgressFn, StorageApi};

use crate::body::progress_body;
use crate::config::HttpConfig;
use crate::{Error, request_failure};

/// Integrity header carrying the base64 SHA-256 of the body.
pub const CHECKSUM_HEADER: &str = "x-amz-checksum-sha256";

/// Object-store client. Sends no credentials: the presigned URL is the
/// authorization.
pub struct HttpStorageClient {
    http: reqwest::Client,
    send_checksum: bool,
}

impl HttpStorageClient {
    pub fn new(config: &HttpConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            http,
            send_checksum: config.send_checksum,
        })
    }

    async fn put(
        &self,
        url: &str,
        file: &UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), ApiFailure> {
        let total = file.size();
        let checksum = if self.send_checksum {
            Some(checksum_of(file).await?)
        } else {
            None
        };

        let body = progress_body(file, progress).await?;

        let mut request = self
            .http
            .put(url)
            .header(CONTENT_TYPE, file.content_type_or_default())
            .header(CONTENT_LENGTH, total);
        if let Some(sum) = checksum {
            request = request.header(CHECKSUM_HEADER, sum);
        }

        debug!(file = %file.name(), bytes = total, "starting PUT");
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(file = %file.name(), "PUT aborted");
                return Err(ApiFailure::new(ErrorCode::Canceled, CANCELED_MESSAGE));
            }
            result = request.body(body).send() => result.map_err(|e| request_failure(&e))?,
        };

        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let bytes = resp.bytes().await.unwrap_or_default();
        let failure = storage_failure(status, &bytes);
        warn!(file = %file.name(), status, code = %failure.code, "storage rejected PUT");
        Err(failure)
    }
}

impl StorageApi for HttpStorageClient {
    fn put_object<'a>(
        &'a self,
        url: &'a str,
        file: &'a UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), ApiFailure>> {
        Box::pin(self.put(url, file, progress, cancel))
    }
}

async fn checksum_of(file: &UploadFile) -> Result<String, ApiFailure> {
    match file.source() {
        FileSource::Memory(data) => Ok(checksum_base64(data)),
        FileSource::Path(path) => {
            let path = path.clone();
            let name = file.name().to_string();
            tokio::task::spawn_blocking(move || file_checksum_base64(&path))
                .await
                .map_err(|e| ApiFailure::new(ErrorCode::Unknown, e.to_string()))?
                .map_err(|e| {
                    ApiFailure::new(ErrorCode::Unknown, format!("Cannot read {name}: {e}"))
                })
        }
    }
}

/// Maps an object-store error response.
///
/// Stores answer in XML. An expired signature becomes `EXPIRED_SESSION`,
/// retryable statuses keep their status code, everything else is
/// `S3_ERROR`.
fn storage_failure(status: u16, body: &[u8]) -> ApiFailure {
    let text = String::from_utf8_lossy(body);
    let message = xml_element(&text, "Message").map(str::to_string);

    if text.contains("Request has expired") || xml_element(&text, "Code") == Some("ExpiredToken") {
        return ApiFailure::new(
            ErrorCode::ExpiredSession,
            message.unwrap_or_else(|| "Upload URL has expired".to_string()),
        )
        .with_status(status);
    }

    match status {
        408 | 429 | 500..=599 => ApiFailure::from_response(status, body),
        _ => ApiFailure::new(
            ErrorCode::S3Error,
            message.unwrap_or_else(|| format!("Storage rejected the upload with status {status}")),
        )
        .with_status(status),
    }
}

fn xml_element<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::test_server;

    fn client(send_checksum: bool) -> HttpStorageClient {
        HttpStorageClient::new(&HttpConfig {
            send_checksum,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<(u64, u64)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let progress: ProgressFn = Arc::new(move |loaded, total| {
            sink.lock().unwrap().push((loaded, total));
        });
        (progress, events)
    }

    #[tokio::test]
    async fn put_streams_memory_bytes() {
        let server = test_server::respond(200, "").await;
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let file = UploadFile::from_bytes("castle.pdf", "application/pdf", data.clone());
        let (progress, events) = recorder();

        let url = format!("{}/bucket/key?X-Amz-Signature=abc", server.url);
        client(false)
            .put_object(&url, &file, progress, CancellationToken::new())
            .await
            .unwrap();

        let req = server.request.await.unwrap();
        assert_eq!(req.method, "PUT");
        assert_eq!(req.path, "/bucket/key?X-Amz-Signature=abc");
        assert_eq!(req.header("content-type"), Some("application/pdf"));
        assert_eq!(req.header("content-length"), Some("200000"));
        assert!(req.header("authorization").is_none());
        assert!(req.header(CHECKSUM_HEADER).is_none());
        assert_eq!(req.body, data);

        let events = events.lock().unwrap();
        assert_eq!(events.last(), Some(&(200_000, 200_000)));
        assert!(events.windows(2).all(|w| w[0].0 < w[1].0));

        server.handle.abort();
    }

    #[tokio::test]
    async fn put_streams_file_from_disk_with_checksum() {
        let server = test_server::respond(200, "").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let file = UploadFile::from_path(&path).unwrap();
        let (progress, events) = recorder();

        client(true)
            .put_object(&server.url, &file, progress, CancellationToken::new())
            .await
            .unwrap();

        let req = server.request.await.unwrap();
        assert_eq!(req.body, b"hello world");
        assert_eq!(req.header("content-type"), Some("application/pdf"));
        assert_eq!(
            req.header(CHECKSUM_HEADER),
            Some("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=")
        );
        assert_eq!(events.lock().unwrap().last(), Some(&(11, 11)));

        server.handle.abort();
    }

    #[tokio::test]
    async fn expired_signature_maps_to_expired_session() {
        let xml = "<?xml version=\"1.0\"?><Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>";
        let server = test_server::respond(403, xml).await;
        let file = UploadFile::from_bytes("a.pdf", "application/pdf", vec![1u8; 10]);
        let (progress, _) = recorder();

        let err = client(false)
            .put_object(&server.url, &file, progress, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpiredSession);
        assert_eq!(err.message, "Request has expired");
        assert_eq!(err.http_status, Some(403));

        server.handle.abort();
    }

    #[tokio::test]
    async fn other_rejections_are_storage_errors() {
        let xml = "<Error><Code>SignatureDoesNotMatch</Code><Message>Bad signature</Message></Error>";
        let server = test_server::respond(403, xml).await;
        let file = UploadFile::from_bytes("a.pdf", "application/pdf", vec![1u8; 10]);
        let (progress, _) = recorder();

        let err = client(false)
            .put_object(&server.url, &file, progress, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::S3Error);
        assert_eq!(err.message, "Bad signature");
        assert!(!err.is_transient());

        server.handle.abort();
    }

    #[tokio::test]
    async fn server_errors_stay_transient() {
        let server = test_server::respond(503, "<Error><Code>SlowDown</Code></Error>").await;
        let file = UploadFile::from_bytes("a.pdf", "application/pdf", vec![1u8; 10]);
        let (progress, _) = recorder();

        let err = client(false)
            .put_object(&server.url, &file, progress, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert!(err.is_transient());

        server.handle.abort();
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_put() {
        let server = test_server::silent().await;
        let file = UploadFile::from_bytes("a.pdf", "application/pdf", vec![7u8; 1024]);
        let (progress, _) = recorder();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client(false)
            .put_object(&server.url, &file, progress, cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Canceled);
        assert_eq!(err.message, CANCELED_MESSAGE);

        server.handle.abort();
    }

    #[tokio::test]
    async fn missing_file_fails_before_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.pdf");
        std::fs::write(&path, b"x").unwrap();
        let file = UploadFile::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let (progress, _) = recorder();

        let err = client(false)
            .put_object("http://127.0.0.1:9/", &file, progress, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unknown);
        assert!(err.message.contains("gone.pdf"));
        assert!(!err.is_transient());
    }

    #[test]
    fn xml_element_extracts_text() {
        let xml = "<Error><Code> NoSuchKey </Code></Error>";
        assert_eq!(xml_element(xml, "Code"), Some("NoSuchKey"));
        assert_eq!(xml_element(xml, "Message"), None);
    }
}

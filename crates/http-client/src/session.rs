//! JSON client for session creation and completion, plus the multipart
//! direct upload for small files.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mocup_protocol::{
    CompleteSessionRequest, CreateSessionRequest, CreateSessionResponse, ErrorCode, FileRecord,
};
use mocup_transfer::UploadFile;
use mocup_upload::{
    ApiFailure, BoxFuture, CANCELED_MESSAGE, CompletionApi, DirectUploadApi, ProgressFn,
    SessionApi,
};

use crate::body::progress_body;
use crate::config::HttpConfig;
use crate::{Error, request_failure};

/// Session API client. Implements [`SessionApi`], [`CompletionApi`] and
/// [`DirectUploadApi`].
pub struct HttpSessionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(config: &HttpConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.bearer_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| Error::InvalidToken)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    /// Performs a JSON POST and decodes a JSON success body.
    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failure(&e))?;
        decode(endpoint, resp).await
    }

    async fn upload_form(
        &self,
        resource_id: &str,
        file: &UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<FileRecord, ApiFailure> {
        let endpoint = format!("/mocs/{}/files/instruction", encode(resource_id));
        let body = progress_body(file, progress).await?;
        let part = Part::stream_with_length(body, file.size())
            .file_name(file.name().to_string())
            .mime_str(file.content_type_or_default())
            .map_err(|e| {
                ApiFailure::new(ErrorCode::InvalidMimeType, format!("Invalid content type: {e}"))
            })?;
        let form = Form::new().part("file", part);

        debug!(file = %file.name(), bytes = file.size(), "starting direct upload");
        let url = format!("{}{}", self.base_url, endpoint);
        let send = self.http.post(&url).multipart(form).send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(file = %file.name(), "direct upload aborted");
                return Err(ApiFailure::new(ErrorCode::Canceled, CANCELED_MESSAGE));
            }
            result = send => result.map_err(|e| request_failure(&e))?,
        };
        decode(&endpoint, resp).await.inspect_err(|failure| {
            warn!(file = %file.name(), code = %failure.code, "direct upload rejected");
        })
    }
}

/// Decodes a JSON success body, or maps the error payload.
async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, ApiFailure> {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await.map_err(|e| request_failure(&e))?;

    if !(200..300).contains(&status) {
        debug!(endpoint, status, "session API error");
        return Err(ApiFailure::from_response(status, &bytes));
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        ApiFailure::new(ErrorCode::ServerError, format!("Invalid response: {e}"))
            .with_status(status)
    })
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody<'a> {
    session_id: &'a str,
}

impl SessionApi for HttpSessionClient {
    fn create_session<'a>(
        &'a self,
        resource_id: &'a str,
        request: &'a CreateSessionRequest,
    ) -> BoxFuture<'a, Result<CreateSessionResponse, ApiFailure>> {
        Box::pin(async move {
            let endpoint = format!("/mocs/{}/upload-sessions", encode(resource_id));
            self.post_json(&endpoint, request).await
        })
    }
}

impl DirectUploadApi for HttpSessionClient {
    fn upload_direct<'a>(
        &'a self,
        resource_id: &'a str,
        file: &'a UploadFile,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<FileRecord, ApiFailure>> {
        Box::pin(self.upload_form(resource_id, file, progress, cancel))
    }
}

impl CompletionApi for HttpSessionClient {
    fn complete_session<'a>(
        &'a self,
        request: &'a CompleteSessionRequest,
    ) -> BoxFuture<'a, Result<FileRecord, ApiFailure>> {
        Box::pin(async move {
            let endpoint = format!(
                "/mocs/{}/upload-sessions/{}/complete",
                encode(&request.resource_id),
                encode(&request.session_id)
            );
            let body = CompleteBody {
                session_id: &request.session_id,
            };
            self.post_json(&endpoint, &body).await
        })
    }
}

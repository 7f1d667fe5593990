use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Connection settings for the session API and the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HttpConfig {
    /// Root of the session API, without a trailing slash.
    pub base_url: String,
    /// Sent as `Authorization: Bearer ...` to the session API only.
    pub bearer_token: Option<String>,
    /// Per-request timeout for session calls.
    pub request_timeout_secs: u64,
    /// Connect timeout for the presigned PUT. The transfer itself is
    /// unbounded; cancellation stops it.
    pub connect_timeout_secs: u64,
    /// Attach `x-amz-checksum-sha256` to the PUT.
    pub send_checksum: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer_token: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            send_checksum: false,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Base URL with any trailing slashes removed.
    pub(crate) fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

//! Pieces shared by the HTTP transports.

use searchsync_core::config::EngineConfig;
use searchsync_core::error::SyncError;

/// Build the pooled reqwest client for one engine. Validates `config` first so
/// a missing URL fails here, never on the first call.
pub(crate) fn build_http(config: &EngineConfig) -> Result<reqwest::Client, SyncError> {
    config.validate()?;
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| SyncError::NotConfigured(format!("cannot build HTTP client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> SyncError {
    SyncError::Backend(format!("HTTP error: {e}"))
}

/// Read a non-2xx body for the error message without failing on it.
pub(crate) async fn error_body(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    (status, body)
}

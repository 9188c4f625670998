//! Text generation backend contract.

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

/// Failures reported by a text generation backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("Backend request failed: HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// No answer within the configured timeout.
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded.
    #[error("Invalid response format from backend: {0}")]
    InvalidResponse(String),

    /// The backend answered with no text.
    #[error("Backend returned an empty response")]
    EmptyResponse,
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Deadline for the whole call.
    pub timeout: Duration,
}

/// A prompt-in, text-out generation service.
pub trait TextBackend: Send + Sync {
    /// Generates text for `prompt`.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String, BackendError>>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Maps a reqwest failure onto the backend error vocabulary.
pub(crate) fn classify_request_error(error: &reqwest::Error, timeout: Duration) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout(timeout)
    } else if error.is_decode() {
        BackendError::InvalidResponse(error.to_string())
    } else {
        BackendError::Network(error.to_string())
    }
}

/// Checks an HTTP response for error status.
///
/// On success, returns the response unchanged for further processing.
/// On failure, reads the error body and returns [`BackendError::Status`].
pub(crate) async fn check_error_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|e| {
        tracing::debug!("Failed to read error response body: {e}");
        String::new()
    });
    Err(BackendError::Status { status, body })
}

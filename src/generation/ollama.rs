//! Ollama `/api/generate` backend.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backend::{check_error_response, classify_request_error};
use super::{BackendError, GenerationParams, TextBackend};
use crate::config::GenerationConfig;

/// Nucleus sampling cutoff sent with every request.
const TOP_P: f32 = 0.9;

/// Request body for `/api/generate`.
#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Sampling options for `/api/generate`.
#[derive(Serialize, Debug)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
}

/// Non-streaming response from `/api/generate`.
#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    model: Option<String>,
    eval_count: Option<u64>,
}

/// Client for an Ollama-compatible endpoint.
pub struct OllamaBackend {
    /// HTTP client, owned by one workflow run.
    client: Client,
    /// Base URL, e.g. `http://localhost:11434`.
    base_url: String,
    /// Model identifier.
    model: String,
}

impl OllamaBackend {
    /// Creates a backend from configuration.
    pub fn new(config: &GenerationConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    /// Full URL of the generate endpoint.
    fn api_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/api/generate");
        debug!(base_url = %self.base_url, full_url = %url, "Constructed Ollama API URL");
        url
    }
}

impl TextBackend for OllamaBackend {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            let request = GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict: params.max_tokens,
                    temperature: params.temperature,
                    top_p: TOP_P,
                },
            };

            debug!(
                model = %self.model,
                prompt_len = prompt.len(),
                max_tokens = params.max_tokens,
                timeout_secs = params.timeout.as_secs_f64(),
                "Sending Ollama generate request"
            );

            let response = self
                .client
                .post(self.api_url())
                .timeout(params.timeout)
                .json(&request)
                .send()
                .await
                .map_err(|e| classify_request_error(&e, params.timeout))?;

            let response = check_error_response(response).await?;

            let body: GenerateResponse = response
                .json()
                .await
                .map_err(|e| match classify_request_error(&e, params.timeout) {
                    BackendError::Timeout(t) => BackendError::Timeout(t),
                    _ => BackendError::InvalidResponse(e.to_string()),
                })?;

            info!(
                model = body.model.as_deref().unwrap_or(&self.model),
                eval_count = body.eval_count,
                response_len = body.response.len(),
                "Received Ollama response"
            );

            if body.response.trim().is_empty() {
                return Err(BackendError::EmptyResponse);
            }
            Ok(body.response)
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn backend(endpoint: &str, timeout: Duration) -> OllamaBackend {
        OllamaBackend::new(&GenerationConfig {
            endpoint: endpoint.to_string(),
            model: "codellama:7b".to_string(),
            timeout,
            ..GenerationConfig::default()
        })
        .unwrap()
    }

    fn params(timeout: Duration) -> GenerationParams {
        GenerationParams {
            max_tokens: 64,
            temperature: 0.3,
            timeout,
        }
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        let b = backend("http://localhost:11434/", Duration::from_secs(1));
        assert_eq!(b.api_url(), "http://localhost:11434/api/generate");
    }

    #[tokio::test]
    async fn returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "codellama:7b",
                "stream": false,
                "options": { "num_predict": 64 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "codellama:7b",
                "response": "feat(cli): add flag",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let b = backend(&server.uri(), Duration::from_secs(5));
        let text = b
            .generate("prompt", &params(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(text, "feat(cli): add flag");
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let b = backend(&server.uri(), Duration::from_secs(5));
        let err = b
            .generate("prompt", &params(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Status { status: 404, ref body } if body == "model not found"
        ));
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "  " })))
            .mount(&server)
            .await;

        let b = backend(&server.uri(), Duration::from_secs(5));
        let err = b
            .generate("prompt", &params(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse));
    }

    #[tokio::test]
    async fn non_json_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let b = backend(&server.uri(), Duration::from_secs(5));
        let err = b
            .generate("prompt", &params(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(200);
        let b = backend(&server.uri(), timeout);
        let err = b.generate("prompt", &params(timeout)).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}

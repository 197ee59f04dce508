use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

pub mod types;

use crate::errors::ApiError;
use crate::observability::telemetry::loggable;
use types::*;

/// Trait abstraction over the Language Model Collaborator, enabling test mocking.
///
/// Implementations return either bare text or a structured chat response;
/// callers resolve it with [`Completion::into_text`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<Message>,
        stop: Option<Vec<String>>,
    ) -> Result<Completion>;
}

/// Retry configuration for API calls
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries
    pub max_delay_ms: u64,
    /// HTTP status codes that should trigger a retry
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn from_settings(settings: &crate::config::RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            ..Default::default()
        }
    }

    /// Delay before retry `attempt` (1-based), without jitter.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// OpenAI-compatible chat/completions client.
pub struct ApiClient {
    client: Client,
    config: crate::config::Config,
    base_url: String,
    retry_config: RetryConfig,
}

impl ApiClient {
    pub fn new(config: &crate::config::Config) -> Result<Self> {
        // The orchestrator imposes its own deadline; this one only guards
        // against sockets that never close.
        let request_timeout = config.generation.model_timeout_secs.max(30);
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            config: config.clone(),
            retry_config: RetryConfig::from_settings(&config.retry),
        })
    }

    /// Create client with custom retry configuration
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    fn request_body(&self, messages: &[Message], stop: Option<&[String]>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false,
        });
        if let Some(stop) = stop.filter(|s| !s.is_empty()) {
            body["stop"] = serde_json::json!(stop);
        }
        body
    }

    pub async fn chat(
        &self,
        messages: Vec<Message>,
        stop: Option<Vec<String>>,
    ) -> Result<Completion> {
        let body = self.request_body(&messages, stop.as_deref());
        let text = self.send_with_retry(&body).await?;
        parse_completion(&text)
    }

    /// Send request with exponential backoff retry logic
    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let base = self.retry_config.backoff_delay_ms(attempt);
                // Jitter (±10%)
                let jitter = (base as f64 * 0.2 * (rand_jitter() - 0.5)) as i64;
                let delay_ms = base.saturating_add_signed(jitter);
                warn!(
                    "Retry attempt {}/{} after {}ms delay",
                    attempt, self.retry_config.max_retries, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            debug!("Sending request to {} (attempt {})", url, attempt + 1);

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body_text = response
                            .text()
                            .await
                            .map_err(|e| ApiError::Network(e.to_string()))?;
                        debug!("API response body ({} chars)", body_text.len());
                        return Ok(body_text);
                    }

                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok());
                    let error_text = response.text().await.unwrap_or_default();

                    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                        return Err(ApiError::Authentication(loggable(&error_text)).into());
                    }

                    if self.retry_config.is_retryable(status.as_u16()) {
                        warn!("Retryable error ({}): {}", status, loggable(&error_text));
                        last_error = Some(if status == StatusCode::TOO_MANY_REQUESTS {
                            ApiError::RateLimit {
                                retry_after_secs: retry_after,
                            }
                            .into()
                        } else {
                            ApiError::HttpStatus {
                                status: status.as_u16(),
                                message: loggable(&error_text),
                            }
                            .into()
                        });
                        continue;
                    }

                    return Err(ApiError::HttpStatus {
                        status: status.as_u16(),
                        message: loggable(&error_text),
                    }
                    .into());
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!("Request timed out (retrying)");
                        last_error = Some(ApiError::Timeout.into());
                        continue;
                    }
                    if e.is_connect() {
                        warn!("Network error (retrying): {}", e);
                        last_error = Some(ApiError::Network(e.to_string()).into());
                        continue;
                    }
                    return Err(ApiError::Network(e.to_string()))
                        .context("Failed to send request");
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Resolve a response body into a [`Completion`], whatever server shape sent it.
pub fn parse_completion(body: &str) -> Result<Completion> {
    let raw: RawCompletion = serde_json::from_str(body)
        .map_err(|e| ApiError::Parse(format!("{} (body: {})", e, loggable(body))))?;
    let completion: Completion = raw.into();
    if completion.text().is_none() {
        return Err(ApiError::EmptyCompletion.into());
    }
    Ok(completion)
}

#[async_trait]
impl LlmClient for ApiClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        stop: Option<Vec<String>>,
    ) -> Result<Completion> {
        self.chat(messages, stop).await
    }
}

/// Generate a random jitter value between 0 and 1
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::http_error::{status_error, transport_error};
use crate::application::{ChunkStream, CompletionService};
use crate::domain::{ChatMessage, DomainError};

pub const DEFAULT_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-r1-250120";
const TEMPERATURE: f32 = 0.6;
/// Whole request in non-stream mode; establishment only in stream mode.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

/// HTTP client for an OpenAI-compatible chat completions endpoint.
///
/// The API key is sent as a bearer token and never logged. Streams are handed
/// back as raw body chunks; dropping the stream closes the connection.
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(UPSTREAM_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
            timeout: UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The endpoint URL with its last path segment hidden, for logs.
    pub fn masked_url(&self) -> String {
        mask_url(&self.api_url)
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature: TEMPERATURE,
                stream,
            })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Value, DomainError> {
        debug!("POST {} (stream=false)", self.masked_url());
        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error("upstream request", e))?;

        if !response.status().is_success() {
            return Err(status_error("Upstream API", response).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| transport_error("upstream response", e))
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, DomainError> {
        debug!("POST {} (stream=true)", self.masked_url());
        let response = tokio::time::timeout(self.timeout, self.request(messages, true).send())
            .await
            .map_err(|_| {
                DomainError::timeout(format!(
                    "upstream did not respond within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| transport_error("upstream request", e))?;

        if !response.status().is_success() {
            return Err(status_error("Upstream API", response).await);
        }
        info!("Upstream accepted stream request ({})", response.status());

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| transport_error("upstream stream", e))
            })
            .boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// `https://host/api/v3/chat/completions` -> `https://host/api/v3/chat/***`
pub fn mask_url(url: &str) -> String {
    let path_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[path_start..].rfind('/') {
        Some(slash) if slash + 1 < url.len() - path_start => {
            format!("{}/***", &url[..path_start + slash])
        }
        _ => url.to_string(),
    }
}

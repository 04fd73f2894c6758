use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::http_error::{status_error, transport_error};
use crate::application::{ChatTransport, TurnResponse};
use crate::domain::{ChatMessage, DomainError, StatusReport};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_STREAM: &str = "text/event-stream";

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

/// [`ChatTransport`] over the relay's HTTP API.
///
/// No overall deadline is set on chat requests; the session owns the turn
/// timeout and drops the future (and with it the connection) when it fires.
pub struct RelayHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for RelayHttpClient {
    async fn send_turn(&self, messages: &[ChatMessage]) -> Result<TurnResponse, DomainError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} with {} messages", url, messages.len());
        let response = self
            .client
            .post(&url)
            .query(&[("stream", "true")])
            .json(&ChatRequest { messages })
            .send()
            .await
            .map_err(|e| transport_error("relay request", e))?;

        if !response.status().is_success() {
            return Err(status_error("Relay", response).await);
        }

        let streamed = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(EVENT_STREAM));
        if streamed {
            let chunks = response.bytes_stream().map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| transport_error("relay stream", e))
            });
            return Ok(TurnResponse::Stream(chunks.boxed()));
        }

        debug!("Relay answered without an event stream; reading the whole reply");
        let payload: Value = response
            .json()
            .await
            .map_err(|e| transport_error("relay response", e))?;
        completed_content(&payload).map(TurnResponse::Complete)
    }

    async fn fetch_status(&self) -> Result<StatusReport, DomainError> {
        let url = format!("{}/api/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("status probe", e))?;

        if !response.status().is_success() {
            return Err(status_error("Relay status", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| transport_error("status response", e))
    }
}

/// `choices[0].message.content` of a completed payload.
fn completed_content(payload: &Value) -> Result<String, DomainError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DomainError::upstream("reply payload has no message content"))
}

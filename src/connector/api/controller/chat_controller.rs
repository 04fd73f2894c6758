use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{ChatMessage, DomainError};

use super::super::error::ApiError;
use super::super::Container;

/// Query string of `POST /api/chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
    /// Anything but `false` selects stream mode.
    #[serde(default)]
    pub stream: Option<String>,
}

impl ChatParams {
    pub fn streaming(&self) -> bool {
        self.stream.as_deref().map(str::trim) != Some("false")
    }
}

/// `POST /api/chat`: relays one turn to the upstream.
pub struct ChatController {
    container: Arc<Container>,
}

impl ChatController {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    pub async fn chat(
        &self,
        params: ChatParams,
        body: Result<Json<Value>, JsonRejection>,
    ) -> Result<Response, ApiError> {
        let production = self.container.is_production();
        let relay = self
            .container
            .relay_use_case()
            .map_err(|e| ApiError::from_domain(e, production))?;
        let messages = parse_messages(body)?;
        debug!(
            "Chat request: {} messages, stream={}",
            messages.len(),
            params.streaming()
        );

        if !params.streaming() {
            let payload = relay
                .complete(messages)
                .await
                .map_err(|e| ApiError::from_domain(e, production))?;
            return Ok(Json(payload).into_response());
        }

        let events = relay
            .stream(messages)
            .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.payload())));
        Ok(Sse::new(events).into_response())
    }
}

/// `messages` must be present and a sequence of `{ role, content }`.
fn parse_messages(body: Result<Json<Value>, JsonRejection>) -> Result<Vec<ChatMessage>, ApiError> {
    let Json(mut body) = body.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let messages = match body.get_mut("messages").map(Value::take) {
        Some(messages @ Value::Array(_)) => messages,
        _ => {
            return Err(ApiError::invalid_request(
                "Invalid request format: messages must be an array",
            ))
        }
    };
    serde_json::from_value(messages).map_err(|e| {
        ApiError::from_domain(
            DomainError::invalid_request(format!("Invalid message in request: {}", e)),
            false,
        )
    })
}

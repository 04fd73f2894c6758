use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::domain::DomainError;

/// Code the relay puts in its 503 body when upstream credentials are absent.
pub const API_NOT_CONFIGURED: &str = "API_NOT_CONFIGURED";

/// Classify a reqwest failure that happened before any HTTP status arrived.
pub(crate) fn transport_error(context: &str, error: reqwest::Error) -> DomainError {
    if error.is_timeout() {
        DomainError::timeout(format!("{}: {}", context, error))
    } else if error.is_decode() {
        DomainError::upstream(format!("{}: unreadable response: {}", context, error))
    } else {
        DomainError::network(format!("{}: {}", context, error))
    }
}

/// Either the relay's `{ error: CODE, message, details }` body or an
/// OpenAI-style `{ error: { message } }` body.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<&str> {
        self.error.as_ref().and_then(Value::as_str)
    }

    fn message(&self) -> Option<String> {
        self.message.clone().or_else(|| {
            self.error
                .as_ref()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }
}

/// Turn a non-2xx response into the matching [`DomainError`].
pub(crate) async fn status_error(context: &str, response: reqwest::Response) -> DomainError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    warn!("{} returned {}", context, status);

    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    if status.as_u16() == 503 && body.code() == Some(API_NOT_CONFIGURED) {
        return DomainError::configuration(
            body.message()
                .unwrap_or_else(|| "API is not configured".to_string()),
        );
    }

    let message = body.message().unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });
    let details = body.details.or_else(|| {
        let trimmed = text.trim();
        (!trimmed.is_empty() && body.error.is_none()).then(|| trimmed.to_string())
    });
    DomainError::from_status(status.as_u16(), message, details)
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::connector::adapter::API_NOT_CONFIGURED;
use crate::domain::DomainError;

const GENERIC_MESSAGE: &str = "Internal server error";

/// JSON error body returned by the relay API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip)]
    http_status: StatusCode,
    error: &'static str,
    message: String,
    error_id: String,
    #[serde(rename = "status", skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            http_status: status,
            error: code,
            message: message.into(),
            error_id: short_id(),
            upstream_status: None,
            details: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST_FORMAT", message)
    }

    /// Map a domain failure to its HTTP form. `production` hides details and
    /// internal messages.
    pub fn from_domain(error: DomainError, production: bool) -> Self {
        let upstream_status = error.status_code();
        let details = error.details().map(str::to_string);
        let mut api = match &error {
            DomainError::InvalidRequest(message) => Self::invalid_request(message.clone()),
            DomainError::Configuration(message) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                API_NOT_CONFIGURED,
                message.clone(),
            ),
            DomainError::Auth { status, message } => Self::new(
                status_or(*status, StatusCode::UNAUTHORIZED),
                "API_AUTH_ERROR",
                message.clone(),
            ),
            DomainError::RateLimited(message) => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "API_RATE_LIMIT",
                message.clone(),
            ),
            DomainError::Timeout(_) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "API_TIMEOUT",
                "The upstream API did not respond in time",
            ),
            DomainError::NetworkFailure(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "API_CONNECTION_FAILED",
                "Unable to connect to the API server",
            ),
            DomainError::UpstreamServer { status, message, .. }
            | DomainError::HttpStatus { status, message, .. } => Self::new(
                status_or(*status, StatusCode::BAD_GATEWAY),
                "EXTERNAL_API_ERROR",
                message.clone(),
            ),
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "API_REQUEST_FAILED",
                other.to_string(),
            ),
        };
        api.upstream_status = upstream_status;
        api.details = details;

        if api.http_status.is_server_error() {
            error!("[{}] {}: {}", api.error_id, api.error, error);
        } else {
            warn!("[{}] {}: {}", api.error_id, api.error, error);
        }

        if production {
            api.details = None;
            if api.error == "API_REQUEST_FAILED" {
                api.message = GENERIC_MESSAGE.to_string();
            }
        }
        api
    }

    pub fn status(&self) -> StatusCode {
        self.http_status
    }

    pub fn code(&self) -> &'static str {
        self.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.http_status, Json(self)).into_response()
    }
}

fn status_or(status: u16, fallback: StatusCode) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(fallback)
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_taxonomy_to_status_and_code() {
        let cases = [
            (DomainError::configuration("no key"), 503, API_NOT_CONFIGURED),
            (DomainError::from_status(403, "denied", None), 403, "API_AUTH_ERROR"),
            (DomainError::from_status(429, "slow down", None), 429, "API_RATE_LIMIT"),
            (DomainError::timeout("45s"), 504, "API_TIMEOUT"),
            (DomainError::network("refused"), 502, "API_CONNECTION_FAILED"),
            (DomainError::from_status(500, "boom", None), 500, "EXTERNAL_API_ERROR"),
            (DomainError::from_status(404, "gone", None), 404, "EXTERNAL_API_ERROR"),
            (DomainError::internal("bug"), 500, "API_REQUEST_FAILED"),
        ];
        for (error, status, code) in cases {
            let api = ApiError::from_domain(error, false);
            assert_eq!(api.status().as_u16(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn production_hides_details_and_internal_messages() {
        let upstream = DomainError::from_status(502, "bad gateway", Some("stack".into()));
        let dev = serde_json::to_value(ApiError::from_domain(upstream.clone(), false)).unwrap();
        assert_eq!(dev["details"], "stack");
        assert_eq!(dev["status"], 502);
        assert_eq!(dev["errorId"].as_str().unwrap().len(), 8);

        let prod = serde_json::to_value(ApiError::from_domain(upstream, true)).unwrap();
        assert!(prod.get("details").is_none());

        let internal = serde_json::to_value(ApiError::from_domain(
            DomainError::internal("secret path"),
            true,
        ))
        .unwrap();
        assert_eq!(internal["message"], GENERIC_MESSAGE);
    }
}

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authorization failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Upstream server error ({status}): {message}")]
    UpstreamServer {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("HTTP error ({status}): {message}")]
    HttpStatus {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify a non-2xx HTTP status into the matching error kind.
    ///
    /// `details` carries the raw response body, when there was one.
    pub fn from_status(status: u16, message: impl Into<String>, details: Option<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::InvalidRequest(message),
            401 | 403 => Self::Auth { status, message },
            429 => Self::RateLimited(message),
            500..=599 => Self::UpstreamServer {
                status,
                message,
                details,
            },
            _ => Self::HttpStatus {
                status,
                message,
                details,
            },
        }
    }

    /// Connection-layer failures are the only ones worth another attempt.
    /// Anything that came back with an HTTP status is not assumed transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::NetworkFailure(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::InvalidRequest(_) => Some(400),
            Self::Auth { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::UpstreamServer { status, .. } | Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::UpstreamServer { details, .. } | Self::HttpStatus { details, .. } => {
                details.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_network_failure(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}

//! Collaborator error types

use std::time::Duration;
use thiserror::Error;

/// Error from a text-generation or places call, with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!("Authentication failed: {message}")),
            429 => Self::rate_limit(format!("Rate limit exceeded: {message}")),
            500..=599 => Self::server_error(format!("Server error: {message}")),
            _ => Self::invalid_response(format!("HTTP {status}: {message}")),
        }
    }

    /// Classify a transport failure from reqwest
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::network(format!("Request timeout: {error}"))
        } else if error.is_connect() {
            Self::network(format!("Connection failed: {error}"))
        } else {
            Self::network(format!("Request failed: {error}"))
        }
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Reply could not be used
    InvalidResponse,
    /// Collaborator not configured
    Unavailable,
}

impl ProviderErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Auth => "auth",
            Self::InvalidResponse => "invalid_response",
            Self::Unavailable => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(401, "x").kind, ProviderErrorKind::Auth);
        assert_eq!(ProviderError::from_status(429, "x").kind, ProviderErrorKind::RateLimit);
        assert_eq!(ProviderError::from_status(503, "x").kind, ProviderErrorKind::ServerError);
        assert_eq!(ProviderError::from_status(400, "x").kind, ProviderErrorKind::InvalidResponse);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderErrorKind::Network.is_retryable());
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(!ProviderErrorKind::Auth.is_retryable());
        assert!(!ProviderErrorKind::Unavailable.is_retryable());
        assert!(!ProviderErrorKind::InvalidResponse.is_retryable());
    }
}

//! Typed failures of the business write itself.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Server,
    Network,
    Timeout,
}

impl TransportErrorKind {
    /// Classify an HTTP-style status code. Success codes are not errors and
    /// fall back to `Server` if passed in anyway.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => TransportErrorKind::Unauthorized,
            403 => TransportErrorKind::Forbidden,
            404 | 410 => TransportErrorKind::NotFound,
            409 | 412 => TransportErrorKind::Conflict,
            400 | 422 => TransportErrorKind::Validation,
            429 => TransportErrorKind::RateLimited,
            408 | 504 => TransportErrorKind::Timeout,
            _ => TransportErrorKind::Server,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Unauthorized => "unauthorized",
            TransportErrorKind::Forbidden => "forbidden",
            TransportErrorKind::NotFound => "not_found",
            TransportErrorKind::Conflict => "conflict",
            TransportErrorKind::Validation => "validation",
            TransportErrorKind::RateLimited => "rate_limited",
            TransportErrorKind::Server => "server",
            TransportErrorKind::Network => "network",
            TransportErrorKind::Timeout => "timeout",
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(self) -> bool {
        match self {
            TransportErrorKind::RateLimited
            | TransportErrorKind::Server
            | TransportErrorKind::Network
            | TransportErrorKind::Timeout => true,
            TransportErrorKind::Unauthorized
            | TransportErrorKind::Forbidden
            | TransportErrorKind::NotFound
            | TransportErrorKind::Conflict
            | TransportErrorKind::Validation => false,
        }
    }

    /// Failures caused by the caller's request rather than the service.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Unauthorized
                | TransportErrorKind::Forbidden
                | TransportErrorKind::NotFound
                | TransportErrorKind::Conflict
                | TransportErrorKind::Validation
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::from_status(status), message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

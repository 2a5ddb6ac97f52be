use thiserror::Error;

use crate::application::error::CoordinationErrorKind;

use super::keys::CacheKey;

/// Failure reported by a cache backend or its loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("cache backend unreachable: {0}")]
    Unreachable(String),
    #[error("loading {key} failed: {message}")]
    Load { key: CacheKey, message: String },
    #[error("loading {key} timed out")]
    Timeout { key: CacheKey },
}

impl BackendError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn load(key: &CacheKey, message: impl Into<String>) -> Self {
        Self::Load {
            key: key.clone(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no invalidation rule for domain event `{name}`")]
    UnknownDomainEvent { name: String },
    #[error("cache {operation} failed")]
    Unavailable {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

impl CacheError {
    pub fn unknown_event(name: impl Into<String>) -> Self {
        Self::UnknownDomainEvent { name: name.into() }
    }

    pub fn unavailable(operation: &'static str, source: BackendError) -> Self {
        Self::Unavailable { operation, source }
    }

    pub fn kind(&self) -> CoordinationErrorKind {
        match self {
            CacheError::UnknownDomainEvent { .. } => CoordinationErrorKind::UnknownDomainEvent,
            CacheError::Unavailable { .. } => CoordinationErrorKind::CacheUnavailable,
        }
    }
}

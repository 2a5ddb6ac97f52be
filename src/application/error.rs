use std::fmt;

use thiserror::Error;

use crate::{
    application::audit::AuditError,
    cache::CacheError,
    infra::error::InfraError,
};

/// Cross-cutting discriminant for failures raised around a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinationErrorKind {
    /// Resolver asked about an event with no rule. Caller bug.
    UnknownDomainEvent,
    /// Audit writer given an action outside the taxonomy. Caller bug.
    InvalidAction,
    /// Cache backend unreachable during invalidation or refetch.
    CacheUnavailable,
    /// Audit store rejected an append.
    AuditWriteFailed,
}

impl CoordinationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinationErrorKind::UnknownDomainEvent => "unknown_domain_event",
            CoordinationErrorKind::InvalidAction => "invalid_action",
            CoordinationErrorKind::CacheUnavailable => "cache_unavailable",
            CoordinationErrorKind::AuditWriteFailed => "audit_write_failed",
        }
    }

    /// Integrity failures point at a caller bug and are surfaced immediately.
    pub fn is_integrity(self) -> bool {
        match self {
            CoordinationErrorKind::UnknownDomainEvent | CoordinationErrorKind::InvalidAction => {
                true
            }
            CoordinationErrorKind::CacheUnavailable | CoordinationErrorKind::AuditWriteFailed => {
                false
            }
        }
    }
}

impl fmt::Display for CoordinationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_kinds_are_caller_bugs() {
        assert!(CoordinationErrorKind::UnknownDomainEvent.is_integrity());
        assert!(CoordinationErrorKind::InvalidAction.is_integrity());
        assert!(!CoordinationErrorKind::CacheUnavailable.is_integrity());
        assert!(!CoordinationErrorKind::AuditWriteFailed.is_integrity());
    }

    #[test]
    fn app_error_wraps_cache_error_transparently() {
        let err = AppError::from(CacheError::unknown_event("onNothing"));
        assert_eq!(
            err.to_string(),
            "no invalidation rule for domain event `onNothing`"
        );
    }
}

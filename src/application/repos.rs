//! Persistence collaborator seam.
//!
//! Records are JSON documents grouped into named collections. Every document
//! carries a string `id` field (a UUID).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert a document; it must carry an `id`. Returns the stored document.
    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RepoError>;

    /// Shallow-merge `patch` into the document with `id`.
    async fn update(&self, collection: &str, id: Uuid, patch: Value) -> Result<Value, RepoError>;

    /// Documents whose top-level `field` equals `value`, in insertion order.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, RepoError>;

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), RepoError>;
}

/// Extract and parse the `id` of a document.
pub fn record_id(record: &Value) -> Result<Uuid, RepoError> {
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RepoError::invalid_input("record is missing a string `id`"))?
        .parse()
        .map_err(|err| RepoError::invalid_input(format!("record `id` is not a UUID: {err}")))
}

//! In-process document store used by tests and local tooling.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::application::repos::{CollectionStore, RepoError, record_id};
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory";

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        rw_read(&self.collections, SOURCE, "documents")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

fn position(documents: &[Value], id: Uuid) -> Option<usize> {
    documents
        .iter()
        .position(|document| record_id(document).is_ok_and(|existing| existing == id))
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RepoError> {
        if !record.is_object() {
            return Err(RepoError::invalid_input("record must be a JSON object"));
        }
        let id = record_id(&record)?;

        let mut collections = rw_write(&self.collections, SOURCE, "insert");
        let documents = collections.entry(collection.to_string()).or_default();
        if position(documents, id).is_some() {
            return Err(RepoError::Duplicate {
                constraint: "records_pkey".to_string(),
            });
        }
        documents.push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Value) -> Result<Value, RepoError> {
        let Value::Object(patch) = patch else {
            return Err(RepoError::invalid_input("patch must be a JSON object"));
        };
        let expected = id.to_string();
        if patch
            .get("id")
            .is_some_and(|value| value.as_str() != Some(expected.as_str()))
        {
            return Err(RepoError::invalid_input("record `id` cannot be changed"));
        }

        let mut collections = rw_write(&self.collections, SOURCE, "update");
        let documents = collections.get_mut(collection).ok_or(RepoError::NotFound)?;
        let index = position(documents, id).ok_or(RepoError::NotFound)?;
        let document = &mut documents[index];
        if let Value::Object(fields) = document {
            fields.extend(patch);
        }
        Ok(document.clone())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, RepoError> {
        Ok(rw_read(&self.collections, SOURCE, "query_eq")
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| document.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), RepoError> {
        let mut collections = rw_write(&self.collections, SOURCE, "delete");
        let documents = collections.get_mut(collection).ok_or(RepoError::NotFound)?;
        let index = position(documents, id).ok_or(RepoError::NotFound)?;
        documents.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_then_query_preserves_order() {
        let store = MemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert("orders", json!({ "id": a, "status": "draft" })).await.unwrap();
        store.insert("orders", json!({ "id": b, "status": "approved" })).await.unwrap();
        store.insert("orders", json!({ "id": c, "status": "draft" })).await.unwrap();

        let drafts = store.query_eq("orders", "status", &json!("draft")).await.unwrap();

        let ids: Vec<Uuid> = drafts.iter().map(|doc| record_id(doc).unwrap()).collect();
        assert_eq!(ids, vec![a, c]);
        assert!(store.query_eq("missing", "status", &json!("draft")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert("orders", json!({ "id": id })).await.unwrap();

        let err = store.insert("orders", json!({ "id": id })).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn update_merges_top_level_fields() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .insert("orders", json!({ "id": id, "status": "draft", "priority": 1 }))
            .await
            .unwrap();

        let updated = store
            .update("orders", id, json!({ "status": "approved" }))
            .await
            .unwrap();

        assert_eq!(updated, json!({ "id": id, "status": "approved", "priority": 1 }));
        assert!(matches!(
            store.update("orders", id, json!({ "id": Uuid::new_v4() })).await,
            Err(RepoError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_and_reports_missing() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert("orders", json!({ "id": id })).await.unwrap();

        store.delete("orders", id).await.unwrap();

        assert!(store.documents("orders").is_empty());
        assert!(matches!(
            store.delete("orders", id).await,
            Err(RepoError::NotFound)
        ));
    }
}

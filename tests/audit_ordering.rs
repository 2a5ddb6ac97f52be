use std::sync::Arc;

use orderloom::application::audit::{AuditConfig, AuditError, AuditLogWriter};
use orderloom::application::error::CoordinationErrorKind;
use orderloom::domain::audit::{AuditAction, AuditLogEntry, AuditLogEntryInput};
use orderloom::infra::memory::MemoryStore;
use serde_json::json;
use uuid::Uuid;

fn writer() -> (Arc<AuditLogWriter>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let writer = Arc::new(AuditLogWriter::new(store.clone(), AuditConfig::default()));
    (writer, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_per_order_timestamps_non_decreasing() {
    let (writer, _) = writer();
    let order_id = Uuid::new_v4();

    let tasks: Vec<_> = (0..64)
        .map(|index| {
            let writer = writer.clone();
            tokio::spawn(async move {
                writer
                    .append(
                        AuditLogEntryInput::new(order_id, AuditAction::ItemUpdated, "order_item")
                            .metadata(json!({ "index": index })),
                    )
                    .await
            })
        })
        .collect();

    let mut appended: Vec<AuditLogEntry> = Vec::new();
    for task in tasks {
        appended.push(task.await.unwrap().unwrap());
    }

    let trail = writer.list_for_order(order_id).await.unwrap();
    assert_eq!(trail.len(), 64);
    assert!(
        trail
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    );

    // Entries returned by append agree with what was persisted.
    appended.sort_by_key(|entry| entry.id);
    let mut persisted = trail.clone();
    persisted.sort_by_key(|entry| entry.id);
    assert_eq!(appended, persisted);
}

#[tokio::test]
async fn unknown_action_is_rejected_and_nothing_is_written() {
    let (writer, store) = writer();
    let order_id = Uuid::new_v4();

    let err = writer
        .append(AuditLogEntryInput::with_raw_action(
            order_id,
            "NOT_A_REAL_ACTION",
            "order",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::InvalidAction { .. }));
    assert_eq!(err.kind(), Some(CoordinationErrorKind::InvalidAction));
    assert!(store.documents("audit_logs").is_empty());
    assert!(writer.list_for_order(order_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_documents_use_the_wire_format() {
    let (writer, store) = writer();
    let order_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    writer
        .append(
            AuditLogEntryInput::new(order_id, AuditAction::DesignerAssigned, "order")
                .by_user(user_id)
                .field_change("designerId", None, Some(json!("d-17"))),
        )
        .await
        .unwrap();

    let documents = store.documents("audit_logs");
    let document = documents[0].as_object().unwrap();
    let mut keys: Vec<&str> = document.keys().map(String::as_str).collect();
    keys.sort_unstable();

    insta::assert_snapshot!(keys.join("\n"), @r"
    action
    changesSummary
    createdAt
    entityId
    entityType
    fieldName
    id
    metadata
    newValue
    oldValue
    orderId
    timestamp
    userId
    ");
    assert_eq!(document["action"], json!("DESIGNER_ASSIGNED"));
    assert_eq!(document["orderId"], json!(order_id.to_string()));
    assert_eq!(document["changesSummary"], json!("designerId set to \"d-17\""));
}

#[tokio::test]
async fn orders_do_not_see_each_others_entries() {
    let (writer, _) = writer();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    writer
        .append(AuditLogEntryInput::new(first, AuditAction::OrderCreated, "order"))
        .await
        .unwrap();
    writer
        .append(AuditLogEntryInput::new(second, AuditAction::OrderCreated, "order"))
        .await
        .unwrap();
    writer
        .append(AuditLogEntryInput::new(first, AuditAction::Shipped, "order"))
        .await
        .unwrap();

    let trail = writer.list_for_order(first).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail.iter().all(|entry| entry.order_id == first));
    assert_eq!(trail[1].action, AuditAction::Shipped);
}

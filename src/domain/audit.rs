//! Audit trail records and the closed action taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Every kind of order mutation the audit trail can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderCreated,
    OrderUpdated,
    OrderDeleted,
    StatusChanged,
    PriorityChanged,
    DesignerAssigned,
    DesignerUnassigned,
    ManufacturerAssigned,
    ManufacturerUnassigned,
    SalespersonAssigned,
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
    CustomerUpdated,
    NotesUpdated,
    ProductionStarted,
    ProductionCompleted,
    QualityCheckPassed,
    QualityCheckFailed,
    Shipped,
    Delivered,
    PaymentReceived,
    RefundIssued,
    FileUploaded,
    FileDeleted,
    MessageSent,
    EmailSent,
}

impl AuditAction {
    pub const ALL: [AuditAction; 27] = [
        AuditAction::OrderCreated,
        AuditAction::OrderUpdated,
        AuditAction::OrderDeleted,
        AuditAction::StatusChanged,
        AuditAction::PriorityChanged,
        AuditAction::DesignerAssigned,
        AuditAction::DesignerUnassigned,
        AuditAction::ManufacturerAssigned,
        AuditAction::ManufacturerUnassigned,
        AuditAction::SalespersonAssigned,
        AuditAction::ItemAdded,
        AuditAction::ItemUpdated,
        AuditAction::ItemRemoved,
        AuditAction::CustomerUpdated,
        AuditAction::NotesUpdated,
        AuditAction::ProductionStarted,
        AuditAction::ProductionCompleted,
        AuditAction::QualityCheckPassed,
        AuditAction::QualityCheckFailed,
        AuditAction::Shipped,
        AuditAction::Delivered,
        AuditAction::PaymentReceived,
        AuditAction::RefundIssued,
        AuditAction::FileUploaded,
        AuditAction::FileDeleted,
        AuditAction::MessageSent,
        AuditAction::EmailSent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "ORDER_CREATED",
            AuditAction::OrderUpdated => "ORDER_UPDATED",
            AuditAction::OrderDeleted => "ORDER_DELETED",
            AuditAction::StatusChanged => "STATUS_CHANGED",
            AuditAction::PriorityChanged => "PRIORITY_CHANGED",
            AuditAction::DesignerAssigned => "DESIGNER_ASSIGNED",
            AuditAction::DesignerUnassigned => "DESIGNER_UNASSIGNED",
            AuditAction::ManufacturerAssigned => "MANUFACTURER_ASSIGNED",
            AuditAction::ManufacturerUnassigned => "MANUFACTURER_UNASSIGNED",
            AuditAction::SalespersonAssigned => "SALESPERSON_ASSIGNED",
            AuditAction::ItemAdded => "ITEM_ADDED",
            AuditAction::ItemUpdated => "ITEM_UPDATED",
            AuditAction::ItemRemoved => "ITEM_REMOVED",
            AuditAction::CustomerUpdated => "CUSTOMER_UPDATED",
            AuditAction::NotesUpdated => "NOTES_UPDATED",
            AuditAction::ProductionStarted => "PRODUCTION_STARTED",
            AuditAction::ProductionCompleted => "PRODUCTION_COMPLETED",
            AuditAction::QualityCheckPassed => "QUALITY_CHECK_PASSED",
            AuditAction::QualityCheckFailed => "QUALITY_CHECK_FAILED",
            AuditAction::Shipped => "SHIPPED",
            AuditAction::Delivered => "DELIVERED",
            AuditAction::PaymentReceived => "PAYMENT_RECEIVED",
            AuditAction::RefundIssued => "REFUND_ISSUED",
            AuditAction::FileUploaded => "FILE_UPLOADED",
            AuditAction::FileDeleted => "FILE_DELETED",
            AuditAction::MessageSent => "MESSAGE_SENT",
            AuditAction::EmailSent => "EMAIL_SENT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string is not part of the action taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for AuditAction {
    type Err = UnknownAction;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| UnknownAction(value.to_string()))
    }
}

/// Caller-supplied half of an audit entry.
///
/// `action` stays a raw string until the writer validates it, because it
/// usually arrives from outside the type system (forms, transport payloads).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntryInput {
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub field_name: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub changes_summary: Option<String>,
    pub metadata: Option<Value>,
}

impl AuditLogEntryInput {
    pub fn new(order_id: Uuid, action: AuditAction, entity_type: impl Into<String>) -> Self {
        Self::with_raw_action(order_id, action.as_str(), entity_type)
    }

    pub fn with_raw_action(
        order_id: Uuid,
        action: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            field_name: None,
            old_value: None,
            new_value: None,
            changes_summary: None,
            metadata: None,
        }
    }

    pub fn by_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn on_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Records a single field transition and derives a summary when none was set.
    pub fn field_change(
        mut self,
        field: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        let field = field.into();
        if self.changes_summary.is_none() {
            self.changes_summary = Some(summarize_change(
                &field,
                old_value.as_ref(),
                new_value.as_ref(),
            ));
        }
        self.field_name = Some(field);
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.changes_summary = Some(summary.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Immutable audit record as stored by the audit writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub field_name: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub changes_summary: Option<String>,
    pub metadata: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Human readable one-liner for a field transition, e.g. `status: "draft" -> "approved"`.
pub fn summarize_change(field: &str, old_value: Option<&Value>, new_value: Option<&Value>) -> String {
    match (old_value, new_value) {
        (None, None) => format!("{field} touched"),
        (None, Some(new)) => format!("{field} set to {}", render_value(new)),
        (Some(old), None) => format!("{field} cleared (was {})", render_value(old)),
        (Some(old), Some(new)) => {
            format!("{field}: {} -> {}", render_value(old), render_value(new))
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::String(text) => format!("\"{text}\""),
        other => other.to_string(),
    }
}

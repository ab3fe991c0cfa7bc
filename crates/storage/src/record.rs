use std::fmt;

use contractgate_core::Subject;
use serde::{Deserialize, Serialize};
use time::macros::format_description;

/// JSON object holding a subject's extra attributes.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// Fixed-width, so lexical order matches chronological order.
pub fn now_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Primary key of a subject row: `(subject_type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    pub subject_type: String,
    pub id: String,
}

impl SubjectKey {
    pub fn new(subject_type: &str, id: &str) -> Self {
        SubjectKey {
            subject_type: subject_type.to_string(),
            id: id.to_string(),
        }
    }

    pub fn of<S: Subject + ?Sized>(subject: &S) -> Self {
        SubjectKey::new(subject.subject_type(), subject.id())
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_type, self.id)
    }
}

/// A governed subject as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_type: String,
    /// Domain class reported to the remote authority; `None` means the type tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_class: Option<String>,
    pub id: String,
    pub tenant_id: String,
    pub status: String,
    pub entity_version: i64,
    #[serde(default)]
    pub attributes: Attributes,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

impl SubjectRecord {
    /// A fresh subject at version 0 with no extra attributes.
    pub fn new(subject_type: &str, id: &str, tenant_id: &str, status: &str) -> Self {
        SubjectRecord {
            subject_type: subject_type.to_string(),
            subject_class: None,
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            status: status.to_string(),
            entity_version: 0,
            attributes: Attributes::new(),
            updated_at: now_timestamp(),
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.subject_class = Some(class.to_string());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn key(&self) -> SubjectKey {
        SubjectKey::new(&self.subject_type, &self.id)
    }
}

impl Subject for SubjectRecord {
    fn subject_type(&self) -> &str {
        &self.subject_type
    }

    fn subject_class(&self) -> &str {
        self.subject_class.as_deref().unwrap_or(&self.subject_type)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn entity_version(&self) -> i64 {
        self.entity_version
    }
}

/// Immutable audit record of one committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub id: String,
    pub tenant_id: String,
    pub actor_id: Option<String>,
    /// Where the change came from (`"system"`, `"api"`, `"panel"`, ...).
    pub source: String,
    pub subject_type: String,
    pub subject_id: String,
    pub from_status: String,
    pub to_status: String,
    pub note: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Append-only record of a transition intent.
///
/// `command_key` is unique across the whole ledger; a second insert with the
/// same key fails with `StorageError::DuplicateCommandKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardLedgerEntry {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub world: Option<String>,
    pub subject_type: String,
    pub subject_id: String,
    pub command_key: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub from_version: i64,
    pub to_version: i64,
    /// SHA-256 hex digest of the intent (subject, target status, attributes).
    pub intent_hash: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Delivery state of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Dispatched,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Dispatched => "dispatched",
            OutboxStatus::Failed => "failed",
        }
    }
}

/// A committed transition waiting to be delivered to the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub tenant_id: String,
    pub event_type: String,
    /// Opaque JSON payload; the dispatcher forwards it as-is.
    pub payload: serde_json::Value,
    /// Unique across the outbox.
    pub idempotency_key: String,
    pub status: OutboxStatus,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    pub dispatched_at: Option<String>,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    /// A new pending event.
    pub fn pending(
        id: &str,
        tenant_id: &str,
        event_type: &str,
        idempotency_key: &str,
        payload: serde_json::Value,
    ) -> Self {
        OutboxEvent {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            idempotency_key: idempotency_key.to_string(),
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: now_timestamp(),
            dispatched_at: None,
            last_error: None,
        }
    }
}

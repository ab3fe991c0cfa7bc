/// All errors that can be returned by a ContractStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: the subject's version is no
    /// longer the one the caller read.
    #[error(
        "concurrent conflict on subject {subject_type}/{subject_id}: expected version {expected_version}"
    )]
    ConcurrentConflict {
        subject_type: String,
        subject_id: String,
        expected_version: i64,
    },

    /// No subject with the given (subject_type, id).
    #[error("subject not found: {subject_type}/{subject_id}")]
    SubjectNotFound {
        subject_type: String,
        subject_id: String,
    },

    /// A subject with this (subject_type, id) already exists.
    #[error("subject already exists: {subject_type}/{subject_id}")]
    AlreadyExists {
        subject_type: String,
        subject_id: String,
    },

    /// The guard ledger already holds an entry with this command key.
    #[error("duplicate command key: {command_key}")]
    DuplicateCommandKey { command_key: String },

    /// The outbox already holds an event with this idempotency key.
    #[error("duplicate outbox idempotency key: {idempotency_key}")]
    DuplicateIdempotencyKey { idempotency_key: String },

    /// Outbox event not found.
    #[error("outbox event not found: {event_id}")]
    OutboxEventNotFound { event_id: String },

    /// The outbox event has already left the pending state.
    #[error("outbox event {event_id} is not pending")]
    OutboxNotPending { event_id: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

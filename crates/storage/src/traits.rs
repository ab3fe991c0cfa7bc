use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    Attributes, GuardLedgerEntry, OutboxEvent, OutboxStatus, ProofRecord, SubjectKey,
    SubjectRecord,
};

/// The storage trait for contractgate backends.
///
/// A `ContractStorage` implementation provides durable, transactional storage
/// for governed subjects, proof records, the guard ledger and the outbox.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` starts a transaction and returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` commits and consumes the transaction
///    or `abort_snapshot(snapshot)` rolls it back
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back and any row locks it holds released.
///
/// ## Row Locks
///
/// `get_subject_for_update`, `update_subject` and `insert_subject` take an
/// exclusive lock on the subject row (`SELECT ... FOR UPDATE` semantics). A
/// second snapshot touching the same row waits until the holder commits or
/// aborts. Plain reads outside a snapshot never wait.
///
/// ## OCC Conflict Detection
///
/// `update_subject` is conditional on `entity_version = expected_version`.
/// On mismatch it returns `Err(StorageError::ConcurrentConflict { ... })`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so an executor can share
/// them across tasks.
#[async_trait]
pub trait ContractStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    ///
    /// Unique constraints (ledger command keys, outbox idempotency keys) are
    /// re-checked here; a violation rolls the whole snapshot back.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Subject operations (within snapshot) ─────────────────────────────────

    /// Insert a new subject.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the key is taken.
    async fn insert_subject(
        &self,
        snapshot: &mut Self::Snapshot,
        record: SubjectRecord,
    ) -> Result<(), StorageError>;

    /// Read a subject, locking the row for update.
    ///
    /// Returns `Err(StorageError::SubjectNotFound)` if the subject does not exist.
    async fn get_subject_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        key: &SubjectKey,
    ) -> Result<SubjectRecord, StorageError>;

    /// Version-validated write of status and attributes (OCC).
    ///
    /// `attributes` replaces the stored attribute map. Returns the new
    /// version (`expected_version + 1`).
    async fn update_subject(
        &self,
        snapshot: &mut Self::Snapshot,
        key: &SubjectKey,
        expected_version: i64,
        new_status: &str,
        attributes: Attributes,
    ) -> Result<i64, StorageError>;

    // ── Recording operations (within snapshot) ────────────────────────────────

    /// Insert a proof record. Must share the snapshot of the status change it
    /// describes.
    async fn insert_proof_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ProofRecord,
    ) -> Result<(), StorageError>;

    /// Append a guard ledger entry.
    ///
    /// Returns `Err(StorageError::DuplicateCommandKey)` if the command key is
    /// already recorded (committed or earlier in this snapshot).
    async fn insert_guard_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: GuardLedgerEntry,
    ) -> Result<(), StorageError>;

    /// Look up a ledger entry by command key, including entries written
    /// earlier in this snapshot.
    async fn find_guard_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        command_key: &str,
    ) -> Result<Option<GuardLedgerEntry>, StorageError>;

    /// Enqueue an outbox event in the same snapshot as the change it carries.
    ///
    /// Returns `Err(StorageError::DuplicateIdempotencyKey)` on a key clash.
    async fn enqueue_outbox_event(
        &self,
        snapshot: &mut Self::Snapshot,
        event: OutboxEvent,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Read a subject without locking.
    async fn get_subject(&self, key: &SubjectKey) -> Result<SubjectRecord, StorageError>;

    /// Proof records for one subject, oldest first.
    async fn list_proof_records(&self, key: &SubjectKey)
        -> Result<Vec<ProofRecord>, StorageError>;

    /// Ledger entries for one subject, oldest first.
    async fn list_guard_entries(
        &self,
        key: &SubjectKey,
    ) -> Result<Vec<GuardLedgerEntry>, StorageError>;

    // ── Outbox consumer operations (used by the external dispatcher) ──────────

    async fn get_outbox_event(&self, event_id: &str) -> Result<OutboxEvent, StorageError>;

    /// Pending events ordered by creation time (ties in insertion order).
    ///
    /// `limit` of 0 means no limit.
    async fn list_pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEvent>, StorageError>;

    /// Mark a pending event as delivered.
    async fn mark_outbox_dispatched(
        &self,
        event_id: &str,
        dispatched_at: &str,
    ) -> Result<(), StorageError>;

    /// Record a failed delivery attempt: increments `attempts`, stores
    /// `last_error`, and moves the event to `failed` once `attempts` reaches
    /// `max_attempts`. Returns the resulting status.
    async fn record_outbox_failure(
        &self,
        event_id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<OutboxStatus, StorageError>;
}

//! In-memory `ContractStorage` backend.
//!
//! Committed data lives behind one `std::sync::Mutex`; every subject row also
//! has its own `tokio::sync::Mutex` that a snapshot holds (as an owned guard)
//! from the first locking call until it commits, aborts or is dropped. Writes
//! are buffered in the snapshot and applied in one step at commit, so readers
//! outside the snapshot never see partial state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::record::{
    now_timestamp, Attributes, GuardLedgerEntry, OutboxEvent, OutboxStatus, ProofRecord,
    SubjectKey, SubjectRecord,
};
use crate::traits::ContractStorage;

type RowLock = tokio::sync::Mutex<()>;

/// Shared in-memory storage. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<SubjectKey, Arc<RowLock>>>,
}

#[derive(Default)]
struct Tables {
    subjects: BTreeMap<SubjectKey, SubjectRecord>,
    proofs: Vec<ProofRecord>,
    ledger: Vec<GuardLedgerEntry>,
    outbox: Vec<OutboxEvent>,
}

/// An open transaction against [`MemoryStorage`]. Dropping it rolls back.
#[derive(Default)]
pub struct MemorySnapshot {
    locks: HashMap<SubjectKey, OwnedMutexGuard<()>>,
    inserted: BTreeMap<SubjectKey, SubjectRecord>,
    updated: BTreeMap<SubjectKey, SubjectRecord>,
    /// Committed version each updated row was read at.
    base_versions: HashMap<SubjectKey, i64>,
    proofs: Vec<ProofRecord>,
    ledger: Vec<GuardLedgerEntry>,
    outbox: Vec<OutboxEvent>,
}

impl MemorySnapshot {
    fn current(&self, tables: &Tables, key: &SubjectKey) -> Option<SubjectRecord> {
        self.updated
            .get(key)
            .or_else(|| self.inserted.get(key))
            .or_else(|| tables.subjects.get(key))
            .cloned()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subject in its own snapshot.
    pub async fn seed_subject(&self, record: SubjectRecord) -> Result<(), StorageError> {
        let mut snapshot = self.begin_snapshot().await?;
        self.insert_subject(&mut snapshot, record).await?;
        self.commit_snapshot(snapshot).await
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.shared.tables.lock().map_err(|_| poisoned())
    }

    async fn lock_row(
        &self,
        snapshot: &mut MemorySnapshot,
        key: &SubjectKey,
    ) -> Result<(), StorageError> {
        if snapshot.locks.contains_key(key) {
            return Ok(());
        }
        let lock = {
            let mut locks = self.shared.row_locks.lock().map_err(|_| poisoned())?;
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        snapshot.locks.insert(key.clone(), guard);
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("memory storage lock poisoned".to_string())
}

fn not_found(key: &SubjectKey) -> StorageError {
    StorageError::SubjectNotFound {
        subject_type: key.subject_type.clone(),
        subject_id: key.id.clone(),
    }
}

#[async_trait]
impl ContractStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, mut snapshot: MemorySnapshot) -> Result<(), StorageError> {
        {
            let mut tables = self.tables()?;

            for key in snapshot.inserted.keys() {
                if tables.subjects.contains_key(key) {
                    return Err(StorageError::AlreadyExists {
                        subject_type: key.subject_type.clone(),
                        subject_id: key.id.clone(),
                    });
                }
            }
            for (key, base) in &snapshot.base_versions {
                match tables.subjects.get(key) {
                    Some(row) if row.entity_version == *base => {}
                    Some(_) => {
                        return Err(StorageError::ConcurrentConflict {
                            subject_type: key.subject_type.clone(),
                            subject_id: key.id.clone(),
                            expected_version: *base,
                        })
                    }
                    None => return Err(not_found(key)),
                }
            }
            for (i, entry) in snapshot.ledger.iter().enumerate() {
                let clash = tables
                    .ledger
                    .iter()
                    .chain(snapshot.ledger[..i].iter())
                    .any(|e| e.command_key == entry.command_key);
                if clash {
                    return Err(StorageError::DuplicateCommandKey {
                        command_key: entry.command_key.clone(),
                    });
                }
            }
            for (i, event) in snapshot.outbox.iter().enumerate() {
                let clash = tables
                    .outbox
                    .iter()
                    .chain(snapshot.outbox[..i].iter())
                    .any(|e| e.idempotency_key == event.idempotency_key);
                if clash {
                    return Err(StorageError::DuplicateIdempotencyKey {
                        idempotency_key: event.idempotency_key.clone(),
                    });
                }
            }

            tables.subjects.extend(std::mem::take(&mut snapshot.inserted));
            tables.subjects.extend(std::mem::take(&mut snapshot.updated));
            tables.proofs.append(&mut snapshot.proofs);
            tables.ledger.append(&mut snapshot.ledger);
            tables.outbox.append(&mut snapshot.outbox);
        }
        // Row locks are released only after the writes are visible.
        drop(snapshot);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_subject(
        &self,
        snapshot: &mut MemorySnapshot,
        record: SubjectRecord,
    ) -> Result<(), StorageError> {
        let key = record.key();
        self.lock_row(snapshot, &key).await?;
        let exists = {
            let tables = self.tables()?;
            snapshot.current(&tables, &key).is_some()
        };
        if exists {
            return Err(StorageError::AlreadyExists {
                subject_type: key.subject_type,
                subject_id: key.id,
            });
        }
        snapshot.inserted.insert(key, record);
        Ok(())
    }

    async fn get_subject_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        key: &SubjectKey,
    ) -> Result<SubjectRecord, StorageError> {
        self.lock_row(snapshot, key).await?;
        let tables = self.tables()?;
        snapshot.current(&tables, key).ok_or_else(|| not_found(key))
    }

    async fn update_subject(
        &self,
        snapshot: &mut MemorySnapshot,
        key: &SubjectKey,
        expected_version: i64,
        new_status: &str,
        attributes: Attributes,
    ) -> Result<i64, StorageError> {
        self.lock_row(snapshot, key).await?;
        let current = {
            let tables = self.tables()?;
            snapshot.current(&tables, key)
        }
        .ok_or_else(|| not_found(key))?;

        if current.entity_version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                subject_type: key.subject_type.clone(),
                subject_id: key.id.clone(),
                expected_version,
            });
        }

        if !snapshot.inserted.contains_key(key) {
            snapshot
                .base_versions
                .entry(key.clone())
                .or_insert(current.entity_version);
        }

        let next = SubjectRecord {
            status: new_status.to_string(),
            entity_version: current.entity_version + 1,
            attributes,
            updated_at: now_timestamp(),
            ..current
        };
        let version = next.entity_version;
        if snapshot.inserted.contains_key(key) {
            snapshot.inserted.insert(key.clone(), next);
        } else {
            snapshot.updated.insert(key.clone(), next);
        }
        Ok(version)
    }

    async fn insert_proof_record(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProofRecord,
    ) -> Result<(), StorageError> {
        snapshot.proofs.push(record);
        Ok(())
    }

    async fn insert_guard_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: GuardLedgerEntry,
    ) -> Result<(), StorageError> {
        let taken = {
            let tables = self.tables()?;
            tables
                .ledger
                .iter()
                .chain(snapshot.ledger.iter())
                .any(|e| e.command_key == entry.command_key)
        };
        if taken {
            return Err(StorageError::DuplicateCommandKey {
                command_key: entry.command_key,
            });
        }
        snapshot.ledger.push(entry);
        Ok(())
    }

    async fn find_guard_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        command_key: &str,
    ) -> Result<Option<GuardLedgerEntry>, StorageError> {
        if let Some(entry) = snapshot.ledger.iter().find(|e| e.command_key == command_key) {
            return Ok(Some(entry.clone()));
        }
        let tables = self.tables()?;
        Ok(tables
            .ledger
            .iter()
            .find(|e| e.command_key == command_key)
            .cloned())
    }

    async fn enqueue_outbox_event(
        &self,
        snapshot: &mut MemorySnapshot,
        event: OutboxEvent,
    ) -> Result<(), StorageError> {
        let taken = {
            let tables = self.tables()?;
            tables
                .outbox
                .iter()
                .chain(snapshot.outbox.iter())
                .any(|e| e.idempotency_key == event.idempotency_key)
        };
        if taken {
            return Err(StorageError::DuplicateIdempotencyKey {
                idempotency_key: event.idempotency_key,
            });
        }
        snapshot.outbox.push(event);
        Ok(())
    }

    async fn get_subject(&self, key: &SubjectKey) -> Result<SubjectRecord, StorageError> {
        let tables = self.tables()?;
        tables
            .subjects
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn list_proof_records(
        &self,
        key: &SubjectKey,
    ) -> Result<Vec<ProofRecord>, StorageError> {
        let tables = self.tables()?;
        Ok(tables
            .proofs
            .iter()
            .filter(|p| p.subject_type == key.subject_type && p.subject_id == key.id)
            .cloned()
            .collect())
    }

    async fn list_guard_entries(
        &self,
        key: &SubjectKey,
    ) -> Result<Vec<GuardLedgerEntry>, StorageError> {
        let tables = self.tables()?;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.subject_type == key.subject_type && e.subject_id == key.id)
            .cloned()
            .collect())
    }

    async fn get_outbox_event(&self, event_id: &str) -> Result<OutboxEvent, StorageError> {
        let tables = self.tables()?;
        tables
            .outbox
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or_else(|| StorageError::OutboxEventNotFound {
                event_id: event_id.to_string(),
            })
    }

    async fn list_pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEvent>, StorageError> {
        let tables = self.tables()?;
        let mut pending: Vec<OutboxEvent> = tables
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        // Stable sort: equal timestamps keep insertion order.
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if limit > 0 {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn mark_outbox_dispatched(
        &self,
        event_id: &str,
        dispatched_at: &str,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables()?;
        let event = pending_event_mut(&mut tables, event_id)?;
        event.status = OutboxStatus::Dispatched;
        event.dispatched_at = Some(dispatched_at.to_string());
        Ok(())
    }

    async fn record_outbox_failure(
        &self,
        event_id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<OutboxStatus, StorageError> {
        let mut tables = self.tables()?;
        let event = pending_event_mut(&mut tables, event_id)?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        if event.attempts >= max_attempts {
            event.status = OutboxStatus::Failed;
        }
        Ok(event.status)
    }
}

fn pending_event_mut<'a>(
    tables: &'a mut Tables,
    event_id: &str,
) -> Result<&'a mut OutboxEvent, StorageError> {
    let event = tables
        .outbox
        .iter_mut()
        .find(|e| e.id == event_id)
        .ok_or_else(|| StorageError::OutboxEventNotFound {
            event_id: event_id.to_string(),
        })?;
    if event.status != OutboxStatus::Pending {
        return Err(StorageError::OutboxNotPending {
            event_id: event_id.to_string(),
        });
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_snapshot_releases_row_lock_and_discards_writes() {
        let storage = MemoryStorage::new();
        storage
            .seed_subject(SubjectRecord::new("order", "o-1", "t-1", "pending"))
            .await
            .unwrap();
        let key = SubjectKey::new("order", "o-1");

        {
            let mut snap = storage.begin_snapshot().await.unwrap();
            storage
                .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
                .await
                .unwrap();
        }

        let mut snap = storage.begin_snapshot().await.unwrap();
        let row = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            storage.get_subject_for_update(&mut snap, &key),
        )
        .await
        .expect("lock should be free after drop")
        .unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.entity_version, 0);
    }

    #[tokio::test]
    async fn insert_then_update_in_one_snapshot() {
        let storage = MemoryStorage::new();
        let key = SubjectKey::new("rental", "r-1");
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert_subject(
                &mut snap,
                SubjectRecord::new("rental", "r-1", "t-1", "requested"),
            )
            .await
            .unwrap();
        let v = storage
            .update_subject(&mut snap, &key, 0, "accepted", Attributes::new())
            .await
            .unwrap();
        assert_eq!(v, 1);
        storage.commit_snapshot(snap).await.unwrap();

        let row = storage.get_subject(&key).await.unwrap();
        assert_eq!(row.status, "accepted");
        assert_eq!(row.entity_version, 1);
    }
}

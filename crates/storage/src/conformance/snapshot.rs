use std::future::Future;

use super::{make_guard_entry, make_order, make_outbox_event, make_proof, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError, SubjectKey};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_insert_invisible",
            uncommitted_insert_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "snapshot_reads_its_own_writes",
            snapshot_reads_its_own_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_every_write",
            abort_discards_every_write(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_snapshot_rolls_back",
            dropped_snapshot_rolls_back(factory).await,
        ),
    ]
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_subject(&mut snap, make_order("order-1", "pending"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let outside = storage.get_subject(&SubjectKey::new("order", "order-1")).await;
    let _ = storage.abort_snapshot(snap).await;
    match outside {
        Err(StorageError::SubjectNotFound { .. }) => Ok(()),
        other => Err(format!("uncommitted insert leaked: {other:?}")),
    }
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = storage.get_subject(&key).await;
    let _ = storage.abort_snapshot(snap).await;
    let row = outside.map_err(|e| format!("get: {e}"))?;
    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!(
            "uncommitted update leaked: {}@{}",
            row.status, row.entity_version
        ));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-1", "order-1", 0))
        .await
        .map_err(|e| format!("ledger: {e}"))?;

    let row = storage.get_subject_for_update(&mut snap, &key).await;
    let found = storage.find_guard_entry(&mut snap, "cmd-1").await;
    let _ = storage.abort_snapshot(snap).await;

    let row = row.map_err(|e| format!("locked read: {e}"))?;
    if row.status != "paid" || row.entity_version != 1 {
        return Err(format!(
            "snapshot did not see its own update: {}@{}",
            row.status, row.entity_version
        ));
    }
    match found {
        Ok(Some(entry)) if entry.command_key == "cmd-1" => Ok(()),
        other => Err(format!("snapshot did not see its own ledger entry: {other:?}")),
    }
}

async fn abort_discards_every_write<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .insert_proof_record(&mut snap, make_proof("p-1", "order-1", "pending", "paid"))
        .await
        .map_err(|e| format!("proof: {e}"))?;
    storage
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-1", "order-1", 0))
        .await
        .map_err(|e| format!("ledger: {e}"))?;
    storage
        .enqueue_outbox_event(
            &mut snap,
            make_outbox_event("evt-1", "cmd-1", "2026-01-01T00:00:00.000Z"),
        )
        .await
        .map_err(|e| format!("outbox: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!("abort kept update: {}@{}", row.status, row.entity_version));
    }
    let proofs = storage
        .list_proof_records(&key)
        .await
        .map_err(|e| format!("proofs: {e}"))?;
    let ledger = storage
        .list_guard_entries(&key)
        .await
        .map_err(|e| format!("ledger: {e}"))?;
    let outbox = storage
        .list_pending_outbox(0)
        .await
        .map_err(|e| format!("outbox: {e}"))?;
    if !proofs.is_empty() || !ledger.is_empty() || !outbox.is_empty() {
        return Err(format!(
            "abort kept records: {} proofs, {} ledger, {} outbox",
            proofs.len(),
            ledger.len(),
            outbox.len()
        ));
    }
    Ok(())
}

async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");

    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
            .await
            .map_err(|e| format!("update: {e}"))?;
    }

    // The row must be lockable again once the snapshot is gone.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let row = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        storage.get_subject_for_update(&mut snap, &key),
    )
    .await
    .map_err(|_| "row lock still held after snapshot was dropped".to_string())?
    .map_err(|e| format!("locked read: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;

    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!(
            "dropped snapshot kept update: {}@{}",
            row.status, row.entity_version
        ));
    }
    Ok(())
}

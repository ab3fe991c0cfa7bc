use std::future::Future;

use super::{make_guard_entry, make_order, make_outbox_event, make_proof, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError, SubjectKey};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "commit",
            "commit_makes_transition_records_visible",
            commit_makes_transition_records_visible(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "commit_replaces_attributes",
            commit_replaces_attributes(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "commit_releases_row_lock",
            commit_releases_row_lock(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "failed_write_leaves_other_subjects_untouched",
            failed_write_leaves_other_subjects_untouched(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "records_are_scoped_to_their_subject",
            records_are_scoped_to_their_subject(factory).await,
        ),
    ]
}

// ── All-or-nothing transition commit ─────────────────────────────────────────

async fn commit_makes_transition_records_visible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let version = storage
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
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if version != 1 {
        return Err(format!("update returned version {version}, expected 1"));
    }
    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.status != "paid" || row.entity_version != 1 {
        return Err(format!("expected paid@1, got {}@{}", row.status, row.entity_version));
    }
    let proofs = storage
        .list_proof_records(&key)
        .await
        .map_err(|e| format!("proofs: {e}"))?;
    if proofs.len() != 1 || proofs[0].to_status != "paid" {
        return Err(format!("expected one proof to paid, got {proofs:?}"));
    }
    let ledger = storage
        .list_guard_entries(&key)
        .await
        .map_err(|e| format!("ledger: {e}"))?;
    if ledger.len() != 1 || ledger[0].to_version != 1 {
        return Err(format!("expected one ledger entry to v1, got {ledger:?}"));
    }
    let event = storage
        .get_outbox_event("evt-1")
        .await
        .map_err(|e| format!("outbox: {e}"))?;
    if event.idempotency_key != "cmd-1" {
        return Err(format!("outbox key mismatch: {}", event.idempotency_key));
    }
    Ok(())
}

async fn commit_replaces_attributes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut initial = Attributes::new();
    initial.insert("amount".to_string(), serde_json::json!(10));
    seed(&storage, make_order("order-1", "pending").with_attributes(initial)).await?;
    let key = SubjectKey::new("order", "order-1");

    let mut next = Attributes::new();
    next.insert("amount".to_string(), serde_json::json!(10));
    next.insert("paid_via".to_string(), serde_json::json!("card"));

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_subject(&mut snap, &key, 0, "paid", next.clone())
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.attributes != next {
        return Err(format!("attributes not stored: {:?}", row.attributes));
    }
    Ok(())
}

async fn commit_releases_row_lock<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .get_subject_for_update(&mut snap, &key)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let locked = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        storage.get_subject_for_update(&mut snap, &key),
    )
    .await;
    let _ = storage.abort_snapshot(snap).await;
    match locked {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("second lock failed: {e}")),
        Err(_) => Err("row lock still held after commit".to_string()),
    }
}

/// A ledger insert that violates the command key constraint must not let the
/// snapshot's other writes through.
async fn failed_write_leaves_other_subjects_untouched<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    seed(&storage, make_order("order-2", "pending")).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-shared", "order-1", 0))
        .await
        .map_err(|e| format!("ledger 1: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit 1: {e}"))?;

    let key2 = SubjectKey::new("order", "order-2");
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_subject(&mut snap, &key2, 0, "paid", Attributes::new())
        .await
        .map_err(|e| format!("update 2: {e}"))?;
    let dup = storage
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-shared", "order-2", 0))
        .await;
    match dup {
        Err(StorageError::DuplicateCommandKey { command_key }) if command_key == "cmd-shared" => {
            let _ = storage.abort_snapshot(snap).await;
        }
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            return Err(format!("expected DuplicateCommandKey, got {e}"));
        }
        Ok(()) => {
            // Backends may defer the unique check to commit time.
            match storage.commit_snapshot(snap).await {
                Err(StorageError::DuplicateCommandKey { .. }) => {}
                other => return Err(format!("duplicate key committed: {other:?}")),
            }
        }
    }

    let row = storage
        .get_subject(&key2)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!(
            "rejected snapshot changed order-2: {}@{}",
            row.status, row.entity_version
        ));
    }
    Ok(())
}

async fn records_are_scoped_to_their_subject<S, F, Fut>(factory: &F) -> Result<(), String>
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
    for (proof, subject) in [("p-1", "order-1"), ("p-2", "order-2"), ("p-3", "order-1")] {
        storage
            .insert_proof_record(&mut snap, make_proof(proof, subject, "pending", "paid"))
            .await
            .map_err(|e| format!("proof {proof}: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let proofs = storage
        .list_proof_records(&SubjectKey::new("order", "order-1"))
        .await
        .map_err(|e| format!("proofs: {e}"))?;
    let ids: Vec<&str> = proofs.iter().map(|p| p.id.as_str()).collect();
    if ids != ["p-1", "p-3"] {
        return Err(format!("expected [p-1, p-3] in order, got {ids:?}"));
    }
    Ok(())
}

use std::future::Future;

use super::{make_order, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError, SubjectKey};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "version_increments_across_commits",
            version_increments_across_commits(factory).await,
        ),
        TestResult::from_result(
            "version",
            "two_updates_in_one_snapshot",
            two_updates_in_one_snapshot(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_returns_conflict",
            stale_version_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "future_version_returns_conflict",
            future_version_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "conflict_leaves_row_unchanged",
            conflict_leaves_row_unchanged(factory).await,
        ),
    ]
}

/// Commit one update in its own snapshot, returning the new version.
async fn commit_update<S: ContractStorage>(
    storage: &S,
    key: &SubjectKey,
    expected_version: i64,
    status: &str,
) -> Result<i64, StorageError> {
    let mut snap = storage.begin_snapshot().await?;
    let version = match storage
        .update_subject(&mut snap, key, expected_version, status, Attributes::new())
        .await
    {
        Ok(v) => v,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            return Err(e);
        }
    };
    storage.commit_snapshot(snap).await?;
    Ok(version)
}

async fn version_increments_across_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");

    for (expected, status) in [(0, "paid"), (1, "cancelled"), (2, "archived")] {
        let v = commit_update(&storage, &key, expected, status)
            .await
            .map_err(|e| format!("update from v{expected}: {e}"))?;
        if v != expected + 1 {
            return Err(format!("expected v{}, got v{v}", expected + 1));
        }
    }
    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.entity_version != 3 || row.status != "archived" {
        return Err(format!("expected archived@3, got {}@{}", row.status, row.entity_version));
    }
    Ok(())
}

async fn two_updates_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| format!("first: {e}"))?;
    let v = storage
        .update_subject(&mut snap, &key, 1, "cancelled", Attributes::new())
        .await
        .map_err(|e| format!("second: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if v != 2 {
        return Err(format!("expected v2, got v{v}"));
    }
    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.entity_version != 2 {
        return Err(format!("stored version {}", row.entity_version));
    }
    Ok(())
}

async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");
    commit_update(&storage, &key, 0, "paid")
        .await
        .map_err(|e| format!("first update: {e}"))?;

    match commit_update(&storage, &key, 0, "cancelled").await {
        Err(StorageError::ConcurrentConflict {
            subject_type,
            subject_id,
            expected_version,
        }) if subject_type == "order" && subject_id == "order-1" && expected_version == 0 => {
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict at v0, got {other:?}")),
    }
}

async fn future_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");
    match commit_update(&storage, &key, 1, "paid").await {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn conflict_leaves_row_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let key = SubjectKey::new("order", "order-1");
    let _ = commit_update(&storage, &key, 5, "paid").await;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!(
            "conflicting write changed row: {}@{}",
            row.status, row.entity_version
        ));
    }
    Ok(())
}

use std::future::Future;
use std::sync::Arc;

use super::{make_order, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError, SubjectKey};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "stale_updates_exactly_one_wins",
            stale_updates_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_insert_exactly_one_wins",
            concurrent_insert_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "locked_read_modify_write_serializes",
            locked_read_modify_write_serializes(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "different_subjects_do_not_block",
            different_subjects_do_not_block(factory).await,
        ),
    ]
}

/// Await every handle, counting `Ok(true)` as a win.
async fn tally(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Result<usize, String> {
    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    Ok(winners)
}

// ── Stale writers: exactly one wins ──────────────────────────────────────────

/// N tasks all try to move the subject from version 0. The row lock
/// serializes them; the first commits and every later writer sees the bumped
/// version and gets ConcurrentConflict.
async fn stale_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), make_order("order-1", "pending")).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let key = SubjectKey::new("order", "order-1");
            let mut snap = s.begin_snapshot().await?;
            match s
                .update_subject(&mut snap, &key, 0, "paid", Attributes::new())
                .await
            {
                Ok(_) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true)
                }
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let winners = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let row = storage
        .get_subject(&SubjectKey::new("order", "order-1"))
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.entity_version != 1 {
        return Err(format!("expected version 1, got {}", row.entity_version));
    }
    Ok(())
}

async fn concurrent_insert_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .insert_subject(&mut snap, make_order("order-1", "pending"))
                .await
            {
                Ok(()) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::AlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::AlreadyExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let winners = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

/// N tasks each lock the row, read its version and write at that version.
/// With row locks every task succeeds and the version ends at N.
async fn locked_read_modify_write_serializes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), make_order("order-1", "pending")).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let key = SubjectKey::new("order", "order-1");
            let mut snap = s.begin_snapshot().await?;
            let row = s.get_subject_for_update(&mut snap, &key).await?;
            tokio::task::yield_now().await;
            let mut attrs = row.attributes.clone();
            attrs.insert("last_writer".to_string(), serde_json::json!(i));
            s.update_subject(&mut snap, &key, row.entity_version, "pending", attrs)
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<bool, StorageError>(true)
        }));
    }

    let winners = tally(handles).await?;
    if winners != N {
        return Err(format!("expected all {N} writers to succeed, got {winners}"));
    }
    let row = storage
        .get_subject(&SubjectKey::new("order", "order-1"))
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.entity_version != N as i64 {
        return Err(format!("expected version {N}, got {}", row.entity_version));
    }
    Ok(())
}

async fn different_subjects_do_not_block<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    seed(&storage, make_order("order-2", "pending")).await?;

    let mut held = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .get_subject_for_update(&mut held, &SubjectKey::new("order", "order-1"))
        .await
        .map_err(|e| format!("lock order-1: {e}"))?;

    let mut other = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let locked = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        storage.get_subject_for_update(&mut other, &SubjectKey::new("order", "order-2")),
    )
    .await;
    let _ = storage.abort_snapshot(other).await;
    let _ = storage.abort_snapshot(held).await;

    match locked {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("lock order-2: {e}")),
        Err(_) => Err("lock on order-1 blocked order-2".to_string()),
    }
}

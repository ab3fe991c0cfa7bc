use std::future::Future;

use super::{make_guard_entry, TestResult};
use crate::{ContractStorage, StorageError, SubjectKey};

pub(super) async fn run_ledger_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "ledger",
            "find_returns_committed_entry",
            find_returns_committed_entry(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "find_unknown_key_returns_none",
            find_unknown_key_returns_none(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "duplicate_key_in_one_snapshot_rejected",
            duplicate_key_in_one_snapshot_rejected(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "duplicate_key_across_snapshots_rejected",
            duplicate_key_across_snapshots_rejected(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "entries_listed_in_insertion_order",
            entries_listed_in_insertion_order(factory).await,
        ),
    ]
}

async fn insert_committed<S: ContractStorage>(
    storage: &S,
    command_key: &str,
    subject_id: &str,
    from_version: i64,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_guard_entry(&mut snap, make_guard_entry(command_key, subject_id, from_version))
        .await
        .map_err(|e| format!("insert {command_key}: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit {command_key}: {e}"))
}

async fn find_returns_committed_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    insert_committed(&storage, "cmd-1", "order-1", 0).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let found = storage.find_guard_entry(&mut snap, "cmd-1").await;
    let _ = storage.abort_snapshot(snap).await;

    match found {
        Ok(Some(entry)) => {
            if entry.subject_id != "order-1" || entry.intent_hash.len() != 64 {
                return Err(format!("entry fields not preserved: {entry:?}"));
            }
            Ok(())
        }
        other => Err(format!("expected Some(entry), got {other:?}")),
    }
}

async fn find_unknown_key_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let found = storage.find_guard_entry(&mut snap, "missing").await;
    let _ = storage.abort_snapshot(snap).await;
    match found {
        Ok(None) => Ok(()),
        other => Err(format!("expected None, got {other:?}")),
    }
}

async fn duplicate_key_in_one_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-1", "order-1", 0))
        .await
        .map_err(|e| format!("first: {e}"))?;
    let second = storage
        .insert_guard_entry(&mut snap, make_guard_entry("cmd-1", "order-1", 1))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match second {
        Err(StorageError::DuplicateCommandKey { command_key }) if command_key == "cmd-1" => Ok(()),
        other => Err(format!("expected DuplicateCommandKey, got {other:?}")),
    }
}

async fn duplicate_key_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    insert_committed(&storage, "cmd-1", "order-1", 0).await?;
    match insert_committed(&storage, "cmd-1", "order-2", 0).await {
        Err(msg) if msg.contains("duplicate command key") => {}
        other => return Err(format!("second insert not rejected: {other:?}")),
    }
    let entries = storage
        .list_guard_entries(&SubjectKey::new("order", "order-2"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !entries.is_empty() {
        return Err(format!("rejected entry stored: {entries:?}"));
    }
    Ok(())
}

async fn entries_listed_in_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    insert_committed(&storage, "cmd-a", "order-1", 0).await?;
    insert_committed(&storage, "cmd-b", "order-1", 1).await?;
    insert_committed(&storage, "cmd-c", "order-1", 2).await?;

    let entries = storage
        .list_guard_entries(&SubjectKey::new("order", "order-1"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    let keys: Vec<&str> = entries.iter().map(|e| e.command_key.as_str()).collect();
    if keys != ["cmd-a", "cmd-b", "cmd-c"] {
        return Err(format!("unexpected order: {keys:?}"));
    }
    Ok(())
}

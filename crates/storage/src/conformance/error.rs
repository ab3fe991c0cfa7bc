use std::future::Future;

use super::{make_order, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError, SubjectKey};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "get_missing_subject_returns_not_found",
            get_missing_subject_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "lock_missing_subject_returns_not_found",
            lock_missing_subject_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "update_missing_subject_returns_not_found",
            update_missing_subject_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "missing_outbox_event_returns_not_found",
            missing_outbox_event_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "errors_render_subject_key",
            errors_render_subject_key(factory).await,
        ),
    ]
}

async fn get_missing_subject_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_subject(&SubjectKey::new("order", "ghost")).await {
        Err(StorageError::SubjectNotFound {
            subject_type,
            subject_id,
        }) if subject_type == "order" && subject_id == "ghost" => Ok(()),
        other => Err(format!("expected SubjectNotFound, got {other:?}")),
    }
}

async fn lock_missing_subject_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .get_subject_for_update(&mut snap, &SubjectKey::new("order", "ghost"))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::SubjectNotFound { .. }) => Ok(()),
        other => Err(format!("expected SubjectNotFound, got {other:?}")),
    }
}

async fn update_missing_subject_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .update_subject(
            &mut snap,
            &SubjectKey::new("order", "ghost"),
            0,
            "paid",
            Attributes::new(),
        )
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::SubjectNotFound { .. }) => Ok(()),
        other => Err(format!("expected SubjectNotFound, got {other:?}")),
    }
}

async fn missing_outbox_event_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_outbox_event("nope").await {
        Err(StorageError::OutboxEventNotFound { event_id }) if event_id == "nope" => {}
        other => return Err(format!("get: expected OutboxEventNotFound, got {other:?}")),
    }
    match storage
        .mark_outbox_dispatched("nope", "2026-01-01T00:00:00.000Z")
        .await
    {
        Err(StorageError::OutboxEventNotFound { .. }) => {}
        other => return Err(format!("mark: expected OutboxEventNotFound, got {other:?}")),
    }
    match storage.record_outbox_failure("nope", "boom", 3).await {
        Err(StorageError::OutboxEventNotFound { .. }) => Ok(()),
        other => Err(format!("fail: expected OutboxEventNotFound, got {other:?}")),
    }
}

async fn errors_render_subject_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("order-1", "pending")).await?;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .update_subject(
            &mut snap,
            &SubjectKey::new("order", "order-1"),
            7,
            "paid",
            Attributes::new(),
        )
        .await;
    let _ = storage.abort_snapshot(snap).await;
    let err = match result {
        Err(e) => e,
        Ok(v) => return Err(format!("stale update succeeded with version {v}")),
    };
    let msg = err.to_string();
    if !msg.contains("order/order-1") || !msg.contains('7') {
        return Err(format!("message missing key or version: {msg}"));
    }
    Ok(())
}

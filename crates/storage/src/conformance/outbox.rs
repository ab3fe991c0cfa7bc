use std::future::Future;

use super::{make_outbox_event, TestResult};
use crate::{ContractStorage, OutboxEvent, OutboxStatus, StorageError};

pub(super) async fn run_outbox_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "outbox",
            "pending_listed_oldest_first",
            pending_listed_oldest_first(factory).await,
        ),
        TestResult::from_result(
            "outbox",
            "limit_caps_pending_list",
            limit_caps_pending_list(factory).await,
        ),
        TestResult::from_result(
            "outbox",
            "dispatched_event_leaves_pending_list",
            dispatched_event_leaves_pending_list(factory).await,
        ),
        TestResult::from_result(
            "outbox",
            "failures_count_until_max_attempts",
            failures_count_until_max_attempts(factory).await,
        ),
        TestResult::from_result(
            "outbox",
            "duplicate_idempotency_key_rejected",
            duplicate_idempotency_key_rejected(factory).await,
        ),
    ]
}

async fn enqueue_committed<S: ContractStorage>(
    storage: &S,
    events: Vec<OutboxEvent>,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for event in events {
        let id = event.id.clone();
        storage
            .enqueue_outbox_event(&mut snap, event)
            .await
            .map_err(|e| format!("enqueue {id}: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}

fn ids(events: &[OutboxEvent]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

async fn pending_listed_oldest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    enqueue_committed(
        &storage,
        vec![
            make_outbox_event("evt-late", "k-1", "2026-01-01T00:00:02.000Z"),
            make_outbox_event("evt-early", "k-2", "2026-01-01T00:00:01.000Z"),
            make_outbox_event("evt-late-2", "k-3", "2026-01-01T00:00:02.000Z"),
        ],
    )
    .await?;

    let pending = storage
        .list_pending_outbox(0)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&pending) != ["evt-early", "evt-late", "evt-late-2"] {
        return Err(format!("unexpected order: {:?}", ids(&pending)));
    }
    if pending.iter().any(|e| e.status != OutboxStatus::Pending || e.attempts != 0) {
        return Err("new events must be pending with zero attempts".to_string());
    }
    Ok(())
}

async fn limit_caps_pending_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    enqueue_committed(
        &storage,
        vec![
            make_outbox_event("evt-1", "k-1", "2026-01-01T00:00:01.000Z"),
            make_outbox_event("evt-2", "k-2", "2026-01-01T00:00:02.000Z"),
            make_outbox_event("evt-3", "k-3", "2026-01-01T00:00:03.000Z"),
        ],
    )
    .await?;

    let pending = storage
        .list_pending_outbox(2)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&pending) != ["evt-1", "evt-2"] {
        return Err(format!("expected first two events, got {:?}", ids(&pending)));
    }
    Ok(())
}

async fn dispatched_event_leaves_pending_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    enqueue_committed(
        &storage,
        vec![
            make_outbox_event("evt-1", "k-1", "2026-01-01T00:00:01.000Z"),
            make_outbox_event("evt-2", "k-2", "2026-01-01T00:00:02.000Z"),
        ],
    )
    .await?;

    storage
        .mark_outbox_dispatched("evt-1", "2026-01-01T00:01:00.000Z")
        .await
        .map_err(|e| format!("mark: {e}"))?;

    let pending = storage
        .list_pending_outbox(0)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if ids(&pending) != ["evt-2"] {
        return Err(format!("expected only evt-2 pending, got {:?}", ids(&pending)));
    }
    let event = storage
        .get_outbox_event("evt-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if event.status != OutboxStatus::Dispatched
        || event.dispatched_at.as_deref() != Some("2026-01-01T00:01:00.000Z")
    {
        return Err(format!("dispatch not recorded: {event:?}"));
    }

    match storage
        .mark_outbox_dispatched("evt-1", "2026-01-01T00:02:00.000Z")
        .await
    {
        Err(StorageError::OutboxNotPending { event_id }) if event_id == "evt-1" => Ok(()),
        other => Err(format!("second dispatch: expected OutboxNotPending, got {other:?}")),
    }
}

async fn failures_count_until_max_attempts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    enqueue_committed(
        &storage,
        vec![make_outbox_event("evt-1", "k-1", "2026-01-01T00:00:01.000Z")],
    )
    .await?;

    for attempt in 1..=2u32 {
        let status = storage
            .record_outbox_failure("evt-1", &format!("timeout #{attempt}"), 3)
            .await
            .map_err(|e| format!("failure {attempt}: {e}"))?;
        if status != OutboxStatus::Pending {
            return Err(format!("attempt {attempt} moved event to {}", status.as_str()));
        }
    }
    let status = storage
        .record_outbox_failure("evt-1", "timeout #3", 3)
        .await
        .map_err(|e| format!("failure 3: {e}"))?;
    if status != OutboxStatus::Failed {
        return Err(format!("expected failed after 3 attempts, got {}", status.as_str()));
    }

    let event = storage
        .get_outbox_event("evt-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if event.attempts != 3 || event.last_error.as_deref() != Some("timeout #3") {
        return Err(format!("bookkeeping wrong: {event:?}"));
    }
    let pending = storage
        .list_pending_outbox(0)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !pending.is_empty() {
        return Err("failed event still listed as pending".to_string());
    }
    Ok(())
}

async fn duplicate_idempotency_key_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    enqueue_committed(
        &storage,
        vec![make_outbox_event("evt-1", "k-1", "2026-01-01T00:00:01.000Z")],
    )
    .await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .enqueue_outbox_event(
            &mut snap,
            make_outbox_event("evt-2", "k-1", "2026-01-01T00:00:02.000Z"),
        )
        .await;
    let result = match result {
        Ok(()) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::DuplicateIdempotencyKey { idempotency_key })
            if idempotency_key == "k-1" =>
        {
            Ok(())
        }
        other => Err(format!("expected DuplicateIdempotencyKey, got {other:?}")),
    }
}

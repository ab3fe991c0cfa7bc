use std::future::Future;

use super::{make_order, seed, TestResult};
use crate::{Attributes, ContractStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "init",
            "insert_creates_subject_at_version_0",
            insert_creates_subject_at_version_0(factory).await,
        ),
        TestResult::from_result(
            "init",
            "insert_preserves_class_and_attributes",
            insert_preserves_class_and_attributes(factory).await,
        ),
        TestResult::from_result(
            "init",
            "duplicate_insert_same_snapshot_fails",
            duplicate_insert_same_snapshot_fails(factory).await,
        ),
        TestResult::from_result(
            "init",
            "duplicate_insert_after_commit_fails",
            duplicate_insert_after_commit_fails(factory).await,
        ),
        TestResult::from_result(
            "init",
            "same_id_different_type_is_distinct",
            same_id_different_type_is_distinct(factory).await,
        ),
    ]
}

async fn insert_creates_subject_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let record = make_order("order-1", "pending");
    let key = record.key();
    seed(&storage, record).await?;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.status != "pending" || row.entity_version != 0 {
        return Err(format!(
            "expected pending@0, got {}@{}",
            row.status, row.entity_version
        ));
    }
    if row.tenant_id != "tenant-1" {
        return Err(format!("tenant not stored: {}", row.tenant_id));
    }
    Ok(())
}

async fn insert_preserves_class_and_attributes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut attrs = Attributes::new();
    attrs.insert("amount".to_string(), serde_json::json!(1250));
    let record = make_order("order-1", "pending")
        .with_class("commerce::Order")
        .with_attributes(attrs.clone());
    let key = record.key();
    seed(&storage, record).await?;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.subject_class.as_deref() != Some("commerce::Order") {
        return Err(format!("class lost: {:?}", row.subject_class));
    }
    if row.attributes != attrs {
        return Err(format!("attributes changed: {:?}", row.attributes));
    }
    Ok(())
}

async fn duplicate_insert_same_snapshot_fails<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| format!("first insert: {e}"))?;
    let result = storage
        .insert_subject(&mut snap, make_order("order-1", "paid"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn duplicate_insert_after_commit_fails<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_subject(&mut snap, make_order("order-1", "pending"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyExists {
            subject_type,
            subject_id,
        }) if subject_type == "order" && subject_id == "order-1" => Ok(()),
        other => Err(format!("expected AlreadyExists(order/order-1), got {other:?}")),
    }
}

async fn same_id_different_type_is_distinct<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_order("x-1", "pending")).await?;
    let payment = crate::SubjectRecord::new("payment", "x-1", "tenant-1", "pending");
    let key = payment.key();
    seed(&storage, payment).await?;

    let row = storage
        .get_subject(&key)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if row.subject_type != "payment" {
        return Err(format!("wrong row returned: {}", row.subject_type));
    }
    Ok(())
}

//! Conformance test suite for `ContractStorage` implementations.
//!
//! A backend-agnostic suite that any `ContractStorage` implementation can run
//! to verify it behaves the way the transition executor relies on:
//!
//! - **Initialization**: subject creation, duplicate detection
//! - **Snapshot isolation**: uncommitted writes invisible, aborts discard
//! - **Atomic commit**: status change, proof, ledger entry and outbox event
//!   land together or not at all
//! - **Version validation / OCC**: stale writes rejected
//! - **Guard ledger**: command key uniqueness and lookup
//! - **Outbox**: pending ordering, dispatch and failure bookkeeping
//! - **Concurrency**: row locks serialize writers on one subject
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! ```ignore
//! use contractgate_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod init;
mod ledger;
mod outbox;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{GuardLedgerEntry, OutboxEvent, ProofRecord, SubjectRecord};
use crate::ContractStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "ledger").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// `factory` is called once per test and must return a fresh, empty storage.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ContractStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(ledger::run_ledger_tests(&factory).await);
    results.extend(outbox::run_outbox_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Insert `record` in its own snapshot and commit.
async fn seed<S: ContractStorage>(storage: &S, record: SubjectRecord) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_subject(&mut snap, record)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

fn make_order(id: &str, status: &str) -> SubjectRecord {
    SubjectRecord::new("order", id, "tenant-1", status)
}

fn make_proof(id: &str, subject_id: &str, from: &str, to: &str) -> ProofRecord {
    ProofRecord {
        id: id.to_string(),
        tenant_id: "tenant-1".to_string(),
        actor_id: Some("user-1".to_string()),
        source: "system".to_string(),
        subject_type: "order".to_string(),
        subject_id: subject_id.to_string(),
        from_status: from.to_string(),
        to_status: to.to_string(),
        note: None,
        created_at: "2026-01-01T00:00:00.000Z".to_string(),
    }
}

fn make_guard_entry(command_key: &str, subject_id: &str, from_version: i64) -> GuardLedgerEntry {
    GuardLedgerEntry {
        tenant_id: "tenant-1".to_string(),
        user_id: Some("user-1".to_string()),
        world: Some("commerce".to_string()),
        subject_type: "order".to_string(),
        subject_id: subject_id.to_string(),
        command_key: command_key.to_string(),
        from_status: Some("pending".to_string()),
        to_status: "paid".to_string(),
        from_version,
        to_version: from_version + 1,
        intent_hash: "0".repeat(64),
        created_at: "2026-01-01T00:00:00.000Z".to_string(),
    }
}

fn make_outbox_event(id: &str, idempotency_key: &str, created_at: &str) -> OutboxEvent {
    let mut event = OutboxEvent::pending(
        id,
        "tenant-1",
        "contract.transition",
        idempotency_key,
        serde_json::json!({"to": "paid"}),
    );
    event.created_at = created_at.to_string();
    event
}

mod common;

use std::sync::Arc;

use common::{executor, seeded, FakeRemote, RecordingDrift, TENANT};
use contractgate_core::AuthorityMode;
use contractgate_engine::{
    ErrorKind, HttpRemoteAuthority, RemoteConfig, RemoteError, RequestContext, TransitionError,
    TransitionExecutor, TransitionMeta,
};
use contractgate_storage::{Attributes, ContractStorage, SubjectKey, SubjectRecord};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn order(status: &str) -> SubjectRecord {
    SubjectRecord::new("order", "o-1", TENANT, status)
}

fn order_key() -> SubjectKey {
    SubjectKey::new("order", "o-1")
}

// ── hybrid ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hybrid_disagreement_emits_exactly_one_drift_event() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let drift = Arc::new(RecordingDrift::default());
    let remote = FakeRemote::allowing(false, "payment_window_closed");
    let exec = executor(storage, AuthorityMode::Hybrid, Some(remote.clone()), drift.clone());

    let result = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::with_request_id("req-5"),
        )
        .await
        .unwrap();

    // Local decided.
    assert_eq!(result.status, "paid");
    assert_eq!(remote.calls(), 1);

    let events = drift.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.subject_type, "order");
    assert_eq!(event.subject_id, "o-1");
    assert_eq!((event.from.as_str(), event.to.as_str()), ("pending", "paid"));
    assert!(event.local_allowed);
    assert!(!event.remote_allowed);
    assert_eq!(event.remote_reason, "payment_window_closed");
    assert_eq!(event.contract_version, "2026.10");
    assert_eq!(event.request_id.as_deref(), Some("req-5"));
}

#[tokio::test]
async fn hybrid_agreement_emits_no_drift() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let drift = Arc::new(RecordingDrift::default());
    let exec = executor(
        storage,
        AuthorityMode::Hybrid,
        Some(FakeRemote::allowing(true, "allowed")),
        drift.clone(),
    );
    exec.transition(
        &order("pending"),
        "paid",
        &TransitionMeta::new(TENANT),
        Attributes::new(),
        &RequestContext::new(),
    )
    .await
    .unwrap();
    assert!(drift.events().is_empty());
}

#[tokio::test]
async fn hybrid_proceeds_when_remote_is_down() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let drift = Arc::new(RecordingDrift::default());
    let remote = FakeRemote::unavailable();
    let exec = executor(storage, AuthorityMode::Hybrid, Some(remote.clone()), drift.clone());

    let result = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.status, "paid");
    assert_eq!(remote.calls(), 1);
    assert!(drift.events().is_empty());
    assert_eq!(exec.storage().list_pending_outbox(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn hybrid_sends_locked_state_and_world_to_remote() {
    let storage = seeded(&[("reservation", "r-1", "confirmed")]).await;
    let remote = FakeRemote::allowing(true, "allowed");
    let exec = contractgate_engine::TransitionExecutor::builder(storage)
        .mode(AuthorityMode::Hybrid)
        .shared_remote(remote.clone())
        .worlds(contractgate_core::WorldRegistry {
            enabled: vec!["marketplace".to_string()],
            disabled: vec!["messaging".to_string()],
            subjects: Default::default(),
        })
        .build();

    // Stale caller copy; the request must carry the locked status.
    let stale = SubjectRecord::new("reservation", "r-1", TENANT, "pending");
    exec.transition(
        &stale,
        "checked_in",
        &TransitionMeta::new(TENANT),
        Attributes::new(),
        &RequestContext::new(),
    )
    .await
    .unwrap();

    let requests = remote.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].subject_ref.status, "confirmed");
    assert_eq!(requests[0].subject_ref.subject_type, "reservation");
    assert_eq!(requests[0].to, "checked_in");
    assert_eq!(requests[0].ctx.world, "marketplace");
}

// ── remote ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_mode_fails_closed_and_leaves_state() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let exec = executor(
        storage,
        AuthorityMode::Remote,
        Some(FakeRemote::unavailable()),
        Arc::default(),
    );

    let err = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    assert!(err.is_retryable());

    let row = exec.storage().get_subject(&order_key()).await.unwrap();
    assert_eq!((row.status.as_str(), row.entity_version), ("pending", 0));
    assert!(exec
        .storage()
        .list_guard_entries(&order_key())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_mode_http_500_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contract/can-transition"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&server)
        .await;

    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let exec = TransitionExecutor::builder(storage)
        .mode(AuthorityMode::Remote)
        .remote(HttpRemoteAuthority::new(RemoteConfig {
            retries: 1,
            retry_delay_ms: 10,
            ..RemoteConfig::new(&server.uri())
        }))
        .build();

    let err = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    match &err {
        TransitionError::RemoteUnavailable(RemoteError::Status { status, .. }) => {
            assert_eq!(*status, 500)
        }
        other => panic!("expected an HTTP status failure, got {other:?}"),
    }

    let row = exec.storage().get_subject(&order_key()).await.unwrap();
    assert_eq!((row.status.as_str(), row.entity_version), ("pending", 0));
    assert!(exec
        .storage()
        .list_proof_records(&order_key())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn remote_mode_without_client_is_unavailable() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let exec = executor(storage, AuthorityMode::Remote, None, Arc::default());
    let err = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn remote_rejection_carries_remote_reason() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let exec = executor(
        storage,
        AuthorityMode::Remote,
        Some(FakeRemote::allowing(false, "fraud_hold")),
        Arc::default(),
    );
    let err = exec
        .transition(
            &order("pending"),
            "paid",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    assert_eq!(err.reason(), "fraud_hold");

    let row = exec.storage().get_subject(&order_key()).await.unwrap();
    assert_eq!(row.status, "pending");
}

#[tokio::test]
async fn remote_allow_is_authoritative() {
    // The local table forbids paid -> pending; the remote allows it.
    let storage = seeded(&[("order", "o-1", "paid")]).await;
    let exec = executor(
        storage,
        AuthorityMode::Remote,
        Some(FakeRemote::allowing(true, "allowed")),
        Arc::default(),
    );
    let result = exec
        .transition(
            &order("paid"),
            "pending",
            &TransitionMeta::new(TENANT),
            Attributes::new(),
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.status, "pending");
    assert_eq!(result.entity_version, 1);
}

#[tokio::test]
async fn embedded_never_calls_remote() {
    let storage = seeded(&[("order", "o-1", "pending")]).await;
    let remote = FakeRemote::allowing(false, "nope");
    let exec = executor(storage, AuthorityMode::Embedded, Some(remote.clone()), Arc::default());
    exec.transition(
        &order("pending"),
        "paid",
        &TransitionMeta::new(TENANT),
        Attributes::new(),
        &RequestContext::new(),
    )
    .await
    .unwrap();
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn same_status_skips_remote_in_every_mode() {
    for mode in [AuthorityMode::Hybrid, AuthorityMode::Remote] {
        let storage = seeded(&[("order", "o-1", "paid")]).await;
        let remote = FakeRemote::unavailable();
        let exec = executor(storage, mode, Some(remote.clone()), Arc::default());
        let result = exec
            .transition(
                &order("paid"),
                "paid",
                &TransitionMeta::new(TENANT),
                Attributes::new(),
                &RequestContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.entity_version, 0);
        assert_eq!(remote.calls(), 0, "{mode} consulted the remote for a no-op");
    }
}

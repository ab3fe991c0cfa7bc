#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contractgate_core::AuthorityMode;
use contractgate_engine::{
    CanTransitionRequest, DriftEvent, DriftReporter, RemoteAuthority, RemoteDecision,
    RemoteError, RequestContext, TransitionExecutor,
};
use contractgate_storage::{MemoryStorage, SubjectRecord};

pub const TENANT: &str = "tenant-1";

/// Drift reporter that keeps every event.
#[derive(Default)]
pub struct RecordingDrift {
    events: Mutex<Vec<DriftEvent>>,
}

impl RecordingDrift {
    pub fn events(&self) -> Vec<DriftEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl DriftReporter for RecordingDrift {
    fn report(&self, event: &DriftEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Remote authority with a canned answer that records what it was asked.
pub struct FakeRemote {
    answer: Result<RemoteDecision, RemoteError>,
    requests: Mutex<Vec<CanTransitionRequest>>,
    calls: AtomicUsize,
}

impl FakeRemote {
    pub fn allowing(allowed: bool, reason: &str) -> Arc<Self> {
        Arc::new(FakeRemote {
            answer: Ok(RemoteDecision {
                allowed,
                reason: reason.to_string(),
                contract_version: Some("2026.10".to_string()),
            }),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(FakeRemote {
            answer: Err(RemoteError::Transport("connection refused".to_string())),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CanTransitionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteAuthority for FakeRemote {
    async fn decide(
        &self,
        request: &CanTransitionRequest,
        _ctx: &RequestContext,
    ) -> Result<RemoteDecision, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone()
    }
}

pub async fn seeded(subjects: &[(&str, &str, &str)]) -> MemoryStorage {
    let storage = MemoryStorage::new();
    for (subject_type, id, status) in subjects {
        storage
            .seed_subject(SubjectRecord::new(subject_type, id, TENANT, status))
            .await
            .unwrap();
    }
    storage
}

pub fn executor(
    storage: MemoryStorage,
    mode: AuthorityMode,
    remote: Option<Arc<FakeRemote>>,
    drift: Arc<RecordingDrift>,
) -> TransitionExecutor<MemoryStorage> {
    let mut builder = TransitionExecutor::builder(storage)
        .mode(mode)
        .drift_reporter(drift);
    if let Some(remote) = remote {
        builder = builder.shared_remote(remote);
    }
    builder.build()
}

//! Mode Gate: decides whether a transition may proceed under the configured
//! [`AuthorityMode`].
//!
//! | mode       | local table          | remote authority                   |
//! |------------|----------------------|------------------------------------|
//! | `embedded` | decides              | never called                       |
//! | `hybrid`   | decides              | asked in shadow, drift reported    |
//! | `remote`   | not consulted        | decides, unavailable = fail-closed |

use std::sync::Arc;

use contractgate_core::{AuthorityMode, LocalDecision, RuleTable, Subject};

use crate::context::RequestContext;
use crate::drift::{DriftEvent, DriftReporter};
use crate::error::TransitionError;
use crate::remote::{
    CanTransitionRequest, DecisionContext, RemoteAuthority, RemoteDecision, RemoteError,
};

/// What the gate saw when it let a transition through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub mode: AuthorityMode,
    pub local: LocalDecision,
    /// The remote answer, when one was obtained.
    pub remote: Option<RemoteDecision>,
    /// Hybrid mode only: local and remote disagreed.
    pub drift: bool,
}

#[derive(Clone)]
pub struct ModeGate {
    mode: AuthorityMode,
    rules: Arc<RuleTable>,
    remote: Option<Arc<dyn RemoteAuthority>>,
    drift: Arc<dyn DriftReporter>,
}

impl ModeGate {
    pub fn new(
        mode: AuthorityMode,
        rules: Arc<RuleTable>,
        remote: Option<Arc<dyn RemoteAuthority>>,
        drift: Arc<dyn DriftReporter>,
    ) -> Self {
        ModeGate {
            mode,
            rules,
            remote,
            drift,
        }
    }

    pub fn mode(&self) -> AuthorityMode {
        self.mode
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Check `subject.status() -> to` and return `Err` whenever the
    /// applicable authority says no.
    ///
    /// `world` is sent as `ctx.world` on remote requests.
    pub async fn assert_can_transition<T: Subject + Sync + ?Sized>(
        &self,
        subject: &T,
        to: &str,
        world: &str,
        ctx: &RequestContext,
    ) -> Result<GateVerdict, TransitionError> {
        let local = self
            .rules
            .evaluate(subject.subject_type(), subject.status(), to);

        match self.mode {
            AuthorityMode::Embedded => {
                reject_local(subject, to, local)?;
                Ok(GateVerdict {
                    mode: self.mode,
                    local,
                    remote: None,
                    drift: false,
                })
            }
            AuthorityMode::Hybrid => {
                let remote = match self.ask_remote(subject, to, world, ctx).await {
                    Ok(decision) => Some(decision),
                    Err(err) => {
                        tracing::debug!(
                            subject_type = subject.subject_type(),
                            subject_id = subject.id(),
                            error = %err,
                            "shadow remote check unavailable"
                        );
                        None
                    }
                };
                let drift = remote
                    .as_ref()
                    .is_some_and(|r| r.allowed != local.is_allowed());
                if let (true, Some(decision)) = (drift, remote.as_ref()) {
                    self.drift
                        .report(&drift_event(subject, to, local, decision, ctx));
                }
                reject_local(subject, to, local)?;
                Ok(GateVerdict {
                    mode: self.mode,
                    local,
                    remote,
                    drift,
                })
            }
            AuthorityMode::Remote => {
                let decision = self
                    .ask_remote(subject, to, world, ctx)
                    .await
                    .map_err(TransitionError::RemoteUnavailable)?;
                if !decision.allowed {
                    let reason = if decision.reason.trim().is_empty() {
                        match reject_local(subject, to, local) {
                            Err(err) => err.to_string(),
                            Ok(()) => "rejected by remote authority".to_string(),
                        }
                    } else {
                        decision.reason.clone()
                    };
                    return Err(TransitionError::RemoteRejected {
                        from: subject.status().to_string(),
                        to: to.to_string(),
                        reason,
                    });
                }
                Ok(GateVerdict {
                    mode: self.mode,
                    local,
                    remote: Some(decision),
                    drift: false,
                })
            }
        }
    }

    async fn ask_remote<T: Subject + Sync + ?Sized>(
        &self,
        subject: &T,
        to: &str,
        world: &str,
        ctx: &RequestContext,
    ) -> Result<RemoteDecision, RemoteError> {
        let remote = self.remote.as_ref().ok_or(RemoteError::NotConfigured)?;
        let request = CanTransitionRequest {
            subject_ref: subject.subject_ref(),
            to: to.to_string(),
            ctx: DecisionContext {
                world: world.to_string(),
            },
        };
        remote.decide(&request, ctx).await
    }
}

/// Map a local rejection to its error.
fn reject_local<T: Subject + ?Sized>(
    subject: &T,
    to: &str,
    decision: LocalDecision,
) -> Result<(), TransitionError> {
    let (subject_type, from, to) = (
        subject.subject_type().to_string(),
        subject.status().to_string(),
        to.to_string(),
    );
    match decision {
        LocalDecision::Unchanged | LocalDecision::Allowed => Ok(()),
        LocalDecision::Terminal => Err(TransitionError::TerminalState {
            subject_type,
            from,
            to,
        }),
        LocalDecision::NotAllowed | LocalDecision::UnknownSubjectType => {
            Err(TransitionError::InvalidTransition {
                subject_type,
                from,
                to,
            })
        }
    }
}

fn drift_event<T: Subject + ?Sized>(
    subject: &T,
    to: &str,
    local: LocalDecision,
    remote: &RemoteDecision,
    ctx: &RequestContext,
) -> DriftEvent {
    DriftEvent {
        subject_type: subject.subject_type().to_string(),
        subject_class: subject.subject_class().to_string(),
        subject_id: subject.id().to_string(),
        from: subject.status().to_string(),
        to: to.to_string(),
        local_allowed: local.is_allowed(),
        remote_allowed: remote.allowed,
        remote_reason: remote.reason.clone(),
        contract_version: remote.contract_version.clone().unwrap_or_default(),
        request_id: ctx.request_id().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use contractgate_storage::SubjectRecord;

    use super::*;
    use crate::error::ErrorKind;

    struct FixedRemote {
        answer: Result<RemoteDecision, RemoteError>,
        calls: AtomicUsize,
    }

    impl FixedRemote {
        fn allows(allowed: bool, reason: &str) -> Arc<Self> {
            Arc::new(FixedRemote {
                answer: Ok(RemoteDecision {
                    allowed,
                    reason: reason.to_string(),
                    contract_version: Some("v7".to_string()),
                }),
                calls: AtomicUsize::new(0),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(FixedRemote {
                answer: Err(RemoteError::Status {
                    status: 503,
                    body: "maintenance".to_string(),
                }),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteAuthority for FixedRemote {
        async fn decide(
            &self,
            _request: &CanTransitionRequest,
            _ctx: &RequestContext,
        ) -> Result<RemoteDecision, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DriftEvent>>);

    impl DriftReporter for Recorder {
        fn report(&self, event: &DriftEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn gate(
        mode: AuthorityMode,
        remote: Option<Arc<FixedRemote>>,
        drift: Arc<Recorder>,
    ) -> ModeGate {
        ModeGate::new(
            mode,
            Arc::new(RuleTable::builtin()),
            remote.map(|r| r as Arc<dyn RemoteAuthority>),
            drift,
        )
    }

    fn order(status: &str) -> SubjectRecord {
        SubjectRecord::new("order", "o-1", "t-1", status)
    }

    #[tokio::test]
    async fn embedded_never_calls_remote() {
        let remote = FixedRemote::allows(false, "nope");
        let g = gate(
            AuthorityMode::Embedded,
            Some(remote.clone()),
            Arc::default(),
        );
        let verdict = g
            .assert_can_transition(&order("pending"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(verdict.local, LocalDecision::Allowed);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedded_terminal_and_invalid_are_distinguished() {
        let g = gate(AuthorityMode::Embedded, None, Arc::default());
        let ctx = RequestContext::new();
        let err = g
            .assert_can_transition(&order("cancelled"), "paid", "commerce", &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TerminalState);
        let err = g
            .assert_can_transition(&order("paid"), "pending", "commerce", &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn hybrid_reports_drift_but_local_wins() {
        let drift = Arc::new(Recorder::default());
        let g = gate(
            AuthorityMode::Hybrid,
            Some(FixedRemote::allows(false, "frozen")),
            drift.clone(),
        );
        let verdict = g
            .assert_can_transition(
                &order("pending"),
                "paid",
                "marketplace",
                &RequestContext::with_request_id("req-9"),
            )
            .await
            .unwrap();
        assert!(verdict.drift);

        let events = drift.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].local_allowed);
        assert!(!events[0].remote_allowed);
        assert_eq!(events[0].remote_reason, "frozen");
        assert_eq!(events[0].contract_version, "v7");
        assert_eq!(events[0].request_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn hybrid_swallows_remote_failure_without_drift() {
        let drift = Arc::new(Recorder::default());
        let g = gate(AuthorityMode::Hybrid, Some(FixedRemote::down()), drift.clone());
        let verdict = g
            .assert_can_transition(&order("pending"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(verdict.remote, None);
        assert!(!verdict.drift);
        assert!(drift.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hybrid_local_rejection_still_reports_drift() {
        let drift = Arc::new(Recorder::default());
        let g = gate(
            AuthorityMode::Hybrid,
            Some(FixedRemote::allows(true, "allowed")),
            drift.clone(),
        );
        let err = g
            .assert_can_transition(&order("cancelled"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TerminalState);
        assert_eq!(drift.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_mode_is_fail_closed() {
        let g = gate(AuthorityMode::Remote, Some(FixedRemote::down()), Arc::default());
        let err = g
            .assert_can_transition(&order("pending"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);

        let unconfigured = gate(AuthorityMode::Remote, None, Arc::default());
        let err = unconfigured
            .assert_can_transition(&order("pending"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::RemoteUnavailable(RemoteError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn remote_allow_overrides_local_table() {
        let g = gate(
            AuthorityMode::Remote,
            Some(FixedRemote::allows(true, "allowed")),
            Arc::default(),
        );
        let verdict = g
            .assert_can_transition(&order("paid"), "pending", "commerce", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(verdict.local, LocalDecision::NotAllowed);
        assert!(verdict.remote.unwrap().allowed);
    }

    #[tokio::test]
    async fn remote_rejection_falls_back_to_local_message() {
        let g = gate(
            AuthorityMode::Remote,
            Some(FixedRemote::allows(false, "")),
            Arc::default(),
        );
        let err = g
            .assert_can_transition(&order("cancelled"), "paid", "commerce", &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteRejected);
        assert!(err.reason().contains("terminal status"), "{}", err.reason());
    }
}

use serde::Serialize;

/// Local and remote authorities disagreed about a transition in hybrid mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftEvent {
    pub subject_type: String,
    pub subject_class: String,
    pub subject_id: String,
    pub from: String,
    pub to: String,
    pub local_allowed: bool,
    pub remote_allowed: bool,
    pub remote_reason: String,
    /// Empty when the remote did not report one.
    pub contract_version: String,
    pub request_id: Option<String>,
}

/// Sink for drift events.
pub trait DriftReporter: Send + Sync {
    fn report(&self, event: &DriftEvent);
}

/// Emits each drift event as a `warn` record on target `contractgate::drift`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDriftReporter;

impl DriftReporter for TracingDriftReporter {
    fn report(&self, event: &DriftEvent) {
        tracing::warn!(
            target: "contractgate::drift",
            subject = %event.subject_class,
            subject_type = %event.subject_type,
            subject_id = %event.subject_id,
            from = %event.from,
            to = %event.to,
            local_allowed = event.local_allowed,
            remote_allowed = event.remote_allowed,
            remote_reason = %event.remote_reason,
            contract_version = %event.contract_version,
            request_id = event.request_id.as_deref().unwrap_or(""),
            "contract drift"
        );
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-request state passed explicitly through the engine.
///
/// Clones share the cancellation flag, so a caller can keep one clone and
/// cancel the transition running with another.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying a correlation id, forwarded as `X-Request-Id` and
    /// copied into outbox payloads.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        RequestContext {
            request_id: Some(request_id.into()),
            cancelled: Arc::default(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Ask in-flight work to stop. Only observed before the subject lock is
    /// taken.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

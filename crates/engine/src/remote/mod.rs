//! Remote authority: the external service that will eventually own the
//! transition rules.
//!
//! The engine talks to it through the [`RemoteAuthority`] trait so tests and
//! alternative transports can stand in for [`HttpRemoteAuthority`].

mod http;

pub use http::HttpRemoteAuthority;

use async_trait::async_trait;
use contractgate_core::SubjectRef;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;

/// Path of the decision endpoint, relative to `RemoteConfig::base_url`.
pub const CAN_TRANSITION_PATH: &str = "contract/can-transition";

/// Connection settings for the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Empty means "not configured": every call fails as unavailable.
    pub base_url: String,
    /// Sent as `X-HOS-API-KEY` when present.
    pub api_key: Option<String>,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Extra attempts after the first.
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: String::new(),
            api_key: None,
            timeout_ms: 1500,
            retries: 1,
            retry_delay_ms: 200,
        }
    }
}

impl RemoteConfig {
    pub fn new(base_url: &str) -> Self {
        RemoteConfig {
            base_url: base_url.to_string(),
            ..RemoteConfig::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// Upper bound on wall time spent across all attempts of one call.
    pub fn total_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(
            self.timeout_ms
                .saturating_mul(u64::from(self.retries).saturating_add(1)),
        )
    }
}

/// Failure talking to the remote authority.
///
/// Every variant means the same thing to the gate: the authority is
/// unavailable. The variants only keep the detail for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote authority is not configured (empty base url)")]
    NotConfigured,

    /// Non-2xx response. `body` is cut to 500 characters.
    #[error("remote authority returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection failure or timeout.
    #[error("remote authority request failed: {0}")]
    Transport(String),

    /// The body was not a JSON object, or not a decision.
    #[error("remote authority returned an invalid body: {0}")]
    InvalidBody(String),
}

/// `ctx` block of a decision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub world: String,
}

/// Body of `POST /contract/can-transition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanTransitionRequest {
    pub subject_ref: SubjectRef,
    pub to: String,
    pub ctx: DecisionContext,
}

/// The remote's answer. Missing fields read as "not allowed, no reason".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDecision {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub contract_version: Option<String>,
}

#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn decide(
        &self,
        request: &CanTransitionRequest,
        ctx: &RequestContext,
    ) -> Result<RemoteDecision, RemoteError>;
}

//! contractgate-engine: decides and applies subject status transitions.
//!
//! The [`TransitionExecutor`] runs every transition inside one storage
//! snapshot: lock the subject row, ask the [`ModeGate`], write status,
//! proof and guard ledger entry, and (in hybrid mode) enqueue an outbox
//! event for the remote authority. The gate's behavior depends on the
//! process-wide [`AuthorityMode`](contractgate_core::AuthorityMode).

pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod executor;
pub mod gate;
mod id;
pub mod ledger;
pub mod outbox;
pub mod proof;
pub mod remote;

pub use config::{ConfigError, EngineConfig};
pub use context::RequestContext;
pub use drift::{DriftEvent, DriftReporter, TracingDriftReporter};
pub use error::{ErrorKind, TransitionError};
pub use executor::{TransitionExecutor, TransitionExecutorBuilder, TransitionMeta};
pub use gate::{GateVerdict, ModeGate};
pub use remote::{
    CanTransitionRequest, DecisionContext, HttpRemoteAuthority, RemoteAuthority, RemoteConfig,
    RemoteDecision, RemoteError,
};

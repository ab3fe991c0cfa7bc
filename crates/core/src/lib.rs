//! contractgate-core: the pure half of the contract transition engine.
//!
//! Nothing in this crate performs I/O beyond reading a rule table file.
//!
//! - [`RuleTable`] -- per-subject-type allowed transitions and terminal sets
//! - [`Subject`] -- capability trait any governed domain entity implements
//! - [`AuthorityMode`] -- which authority decides (`embedded`, `hybrid`, `remote`)
//! - [`WorldRegistry`] -- maps subjects to the world sent as `ctx.world`

pub mod error;
pub mod mode;
pub mod rules;
pub mod subject;
pub mod world;

pub use error::RuleError;
pub use mode::AuthorityMode;
pub use rules::{LocalDecision, RuleTable, TransitionRuleSet};
pub use subject::{Subject, SubjectRef};
pub use world::WorldRegistry;

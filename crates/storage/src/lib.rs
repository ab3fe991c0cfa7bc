pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    now_timestamp, Attributes, GuardLedgerEntry, OutboxEvent, OutboxStatus, ProofRecord,
    SubjectKey, SubjectRecord,
};
pub use traits::ContractStorage;

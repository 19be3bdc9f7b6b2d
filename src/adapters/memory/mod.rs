//! In-process adapters.

pub mod store;

pub use store::{DeleteRecord, FaultError, FaultRule, InMemoryClusterStore, StoreOp, StoredKind};

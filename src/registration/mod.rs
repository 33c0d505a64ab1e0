//! Registration: admin-adjudicated admission to the network.
//!
//! - Block: identity + consent record with a canonical hash
//! - Status: `pending → approved | denied`, `approved → revoked`
//! - Store: one record per installation, persisted regardless of relay ack
//! - Workflow: submission, status updates, permission checks, resync

pub mod block;
pub mod status;
pub mod store;
pub mod workflow;

pub use block::{verify_block_hash, BlockError, Consent, RegistrationBlock};
pub use status::{can_perform, Action, RegistrationStatus};
pub use store::{
    FileRegistrationStore, MemoryRegistrationStore, RegistrationStore, RegistrationStoreError,
};
pub use workflow::{
    RegistrationError, RegistrationSummary, RegistrationWorkflow, SubmitOutcome, SubmitSettings,
};

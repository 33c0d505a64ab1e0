//! RangerBlock - Peer Trust and Ledger Subsystem
//!
//! Governs who may join a relay network, what they may do once inside, and how
//! their actions are recorded.
//!
//! Key principles:
//! - Authentication proves key possession (challenge-response), nothing more
//! - Authorization (roles, bans, timeouts) is re-checked live on every use
//! - Registration is adjudicated by an admin, persisted locally regardless
//! - The ledger is append-only, hash-linked, and sealed with proof-of-work

pub mod auth;
pub mod clock;
pub mod gatekeeper;
pub mod identity;
pub mod ledger;
pub mod registration;
pub mod relay;

//! Gatekeeper module: access control for relay peers
//!
//! - Roles: fixed privilege table (`banned < user < mod < admin < supreme`)
//! - Registry: live role, ban, and timeout resolution per check
//! - Store: flat keyed tables (`users`, `bans`, `timeouts`) plus the audit log
//! - Audit trail: append-only record of admin mutations

pub mod audit_trail;
pub mod registry;
pub mod roles;
pub mod store;

pub use audit_trail::{query_audit_log, AdminAction, AuditEntry, AuditQuery};
pub use registry::{AccessControlRegistry, AccessDecision, AccessError};
pub use roles::{Role, RoleInfo, SUPREME_USER_ID};
pub use store::{AccessStore, BanEntry, JsonFileStore, MemoryAccessStore, StoreError, TimeoutEntry, UserRecord};

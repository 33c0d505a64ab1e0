//! Live access-control checks.
//!
//! Consulted on every connection attempt and every message send. Nothing is
//! cached between calls: each check re-reads the store.
//!
//! Role precedence: supreme > banned > stored role > default `user`.

use super::audit_trail::{AdminAction, AuditEntry};
use super::roles::{Role, RoleInfo, ADMIN_LEVEL, MOD_LEVEL, SUPREME_USER_ID};
use super::store::{AccessStore, BanEntry, StoreError, TimeoutEntry, UserRecord};
use crate::clock::{Clock, Millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of `can_connect` / `can_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whole minutes left on an active timeout (rounded up).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining: None,
        }
    }
}

/// Admin mutation errors.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("The supreme identity cannot be modified")]
    SupremeImmutable,

    #[error("{actor} lacks privilege for {action}")]
    InsufficientPrivilege { actor: String, action: &'static str },

    #[error("Cannot assign role {0} through data")]
    RoleNotAssignable(Role),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves a peer to its role, ban status, and timeout status.
#[derive(Clone)]
pub struct AccessControlRegistry {
    store: Arc<dyn AccessStore>,
    clock: Arc<dyn Clock>,
}

impl AccessControlRegistry {
    pub fn new(store: Arc<dyn AccessStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.store
    }

    pub fn now(&self) -> Millis {
        self.clock.now_millis()
    }

    /// Exact match against the compiled-in supreme id.
    pub fn is_supreme(&self, user_id: &str) -> bool {
        user_id == SUPREME_USER_ID
    }

    pub fn is_banned(&self, user_id: &str) -> bool {
        self.ban_entry(user_id).is_some()
    }

    /// Ban record, ignoring any entry for the supreme identity.
    pub fn ban_entry(&self, user_id: &str) -> Option<BanEntry> {
        if self.is_supreme(user_id) {
            return None;
        }
        table_or_empty("bans", self.store.bans()).remove(user_id)
    }

    pub fn is_timed_out(&self, user_id: &str) -> bool {
        self.active_timeout(user_id).is_some()
    }

    /// Timeout record if still in force (`now < expires_at`).
    pub fn active_timeout(&self, user_id: &str) -> Option<TimeoutEntry> {
        if self.is_supreme(user_id) {
            return None;
        }
        let now = self.clock.now_millis();
        table_or_empty("timeouts", self.store.timeouts())
            .remove(user_id)
            .filter(|t| now < t.expires_at)
    }

    pub fn get_role(&self, user_id: &str) -> Role {
        if self.is_supreme(user_id) {
            return Role::Supreme;
        }
        if self.is_banned(user_id) {
            return Role::Banned;
        }

        let users = table_or_empty("users", self.store.users());
        match users.get(user_id).map(|u| u.role.parse::<Role>()) {
            // Supreme cannot be granted by data
            Some(Ok(Role::Supreme)) => Role::Admin,
            Some(Ok(role)) => role,
            Some(Err(_)) | None => Role::User,
        }
    }

    pub fn role_info(&self, user_id: &str) -> RoleInfo {
        self.get_role(user_id).info()
    }

    pub fn badge(&self, user_id: &str) -> &'static str {
        self.role_info(user_id).icon
    }

    pub fn has_level(&self, user_id: &str, min_level: u8) -> bool {
        self.get_role(user_id).level() >= min_level
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.has_level(user_id, ADMIN_LEVEL)
    }

    pub fn is_moderator(&self, user_id: &str) -> bool {
        self.has_level(user_id, MOD_LEVEL)
    }

    /// Connection gate: denies only on ban.
    pub fn can_connect(&self, user_id: &str) -> AccessDecision {
        if self.is_banned(user_id) {
            return AccessDecision::deny("You are banned from this network.");
        }
        AccessDecision::allow()
    }

    /// Message gate: denies on ban or active timeout.
    pub fn can_message(&self, user_id: &str) -> AccessDecision {
        if self.is_banned(user_id) {
            return AccessDecision::deny("You are banned.");
        }

        if let Some(timeout) = self.active_timeout(user_id) {
            let left = timeout.expires_at - self.clock.now_millis();
            let remaining = left.div_ceil(60_000);
            return AccessDecision {
                allowed: false,
                reason: Some(format!(
                    "You are timed out for {} more minutes.",
                    remaining
                )),
                remaining: Some(remaining),
            };
        }

        AccessDecision::allow()
    }

    /// Ban `target`. Requires moderator level.
    pub fn ban(&self, actor: &str, target: &str, reason: Option<String>) -> Result<(), AccessError> {
        self.authorize(actor, target, MOD_LEVEL, "ban")?;

        let entry = BanEntry {
            reason: reason.clone(),
            banned_by: Some(actor.to_string()),
            banned_at: Some(self.clock.now_millis()),
        };
        self.store.put_ban(target, entry)?;
        self.audit(actor, AdminAction::Ban, target, reason.unwrap_or_default())?;

        info!(actor, target, "user banned");
        Ok(())
    }

    /// Lift a ban. Returns whether one existed.
    pub fn unban(&self, actor: &str, target: &str) -> Result<bool, AccessError> {
        self.authorize(actor, target, MOD_LEVEL, "unban")?;

        let existed = self.store.remove_ban(target)?;
        if existed {
            self.audit(actor, AdminAction::Unban, target, String::new())?;
            info!(actor, target, "user unbanned");
        }
        Ok(existed)
    }

    /// Time `target` out for `duration`. Requires moderator level.
    pub fn timeout(
        &self,
        actor: &str,
        target: &str,
        duration: Duration,
        reason: Option<String>,
    ) -> Result<TimeoutEntry, AccessError> {
        self.authorize(actor, target, MOD_LEVEL, "timeout")?;

        let entry = TimeoutEntry {
            expires_at: self.clock.now_millis() + duration.as_millis() as Millis,
            reason: reason.clone(),
            issued_by: Some(actor.to_string()),
        };
        self.store.put_timeout(target, entry.clone())?;

        let details = format!(
            "{}{}",
            humantime::format_duration(duration),
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        );
        self.audit(actor, AdminAction::Timeout, target, details)?;

        info!(actor, target, secs = duration.as_secs(), "user timed out");
        Ok(entry)
    }

    /// Clear a timeout early. Returns whether one existed.
    pub fn clear_timeout(&self, actor: &str, target: &str) -> Result<bool, AccessError> {
        self.authorize(actor, target, MOD_LEVEL, "clear timeout")?;

        let existed = self.store.remove_timeout(target)?;
        if existed {
            self.audit(actor, AdminAction::ClearTimeout, target, String::new())?;
        }
        Ok(existed)
    }

    /// Assign a stored role. Requires admin level; `supreme` and `banned` are
    /// not assignable (bans go through [`ban`](Self::ban)).
    pub fn set_role(&self, actor: &str, target: &str, role: Role) -> Result<(), AccessError> {
        self.authorize(actor, target, ADMIN_LEVEL, "set role")?;
        if matches!(role, Role::Supreme | Role::Banned) {
            return Err(AccessError::RoleNotAssignable(role));
        }

        let username = table_or_empty("users", self.store.users())
            .remove(target)
            .and_then(|u| u.username);
        self.store.put_user(
            target,
            UserRecord {
                role: role.as_str().to_string(),
                username,
            },
        )?;
        self.audit(actor, AdminAction::SetRole, target, role.to_string())?;

        info!(actor, target, %role, "role assigned");
        Ok(())
    }

    fn authorize(
        &self,
        actor: &str,
        target: &str,
        min_level: u8,
        action: &'static str,
    ) -> Result<(), AccessError> {
        if self.is_supreme(target) {
            warn!(actor, action, "attempted mutation of supreme identity");
            return Err(AccessError::SupremeImmutable);
        }
        if !self.has_level(actor, min_level) {
            return Err(AccessError::InsufficientPrivilege {
                actor: actor.to_string(),
                action,
            });
        }
        Ok(())
    }

    fn audit(
        &self,
        actor: &str,
        action: AdminAction,
        target: &str,
        details: String,
    ) -> Result<(), AccessError> {
        let entry = AuditEntry::new(self.clock.now_millis(), actor, action, target, details);
        self.store.append_audit(entry)?;
        Ok(())
    }
}

/// Unreadable tables are logged and treated as empty.
fn table_or_empty<T>(
    name: &str,
    result: Result<HashMap<String, T>, StoreError>,
) -> HashMap<String, T> {
    result.unwrap_or_else(|e| {
        warn!(table = name, error = %e, "access table unreadable, treating as empty");
        HashMap::new()
    })
}

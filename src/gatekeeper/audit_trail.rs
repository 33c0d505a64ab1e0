//! Admin Audit Trail
//!
//! - Every ban, timeout, and role change is recorded
//! - Fields: timestamp, actor, action, target, details
//! - Append-only (no deletion), stored next to the access tables
//! - Query interface for `rangerblock admin audit`

use crate::clock::Millis;
use serde::{Deserialize, Serialize};

/// Admin mutation kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Ban,
    Unban,
    Timeout,
    ClearTimeout,
    SetRole,
}

impl AdminAction {
    pub fn display(&self) -> &'static str {
        match self {
            AdminAction::Ban => "Ban",
            AdminAction::Unban => "Unban",
            AdminAction::Timeout => "Timeout",
            AdminAction::ClearTimeout => "Clear Timeout",
            AdminAction::SetRole => "Set Role",
        }
    }
}

/// Single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Milliseconds since epoch.
    pub timestamp: Millis,
    /// User id of the admin who acted.
    pub actor: String,
    pub action: AdminAction,
    /// User id acted upon.
    pub target: String,
    pub details: String,
}

impl AuditEntry {
    pub fn new(
        timestamp: Millis,
        actor: &str,
        action: AdminAction,
        target: &str,
        details: String,
    ) -> Self {
        Self {
            timestamp,
            actor: actor.to_string(),
            action,
            target: target.to_string(),
            details,
        }
    }

    /// Human-readable age relative to `now`.
    pub fn relative_time(&self, now: Millis) -> String {
        if now < self.timestamp {
            return format!("Unix: {}", self.timestamp / 1000);
        }

        let elapsed = (now - self.timestamp) / 1000;
        match elapsed {
            0..=60 => "Just now".to_string(),
            61..=3600 => format!("{} min ago", elapsed / 60),
            3601..=86400 => format!("{} hours ago", elapsed / 3600),
            86401..=604800 => format!("{} days ago", elapsed / 86400),
            _ => format!("Unix: {}", self.timestamp / 1000),
        }
    }
}

/// Query options for the audit log.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub action: Option<AdminAction>,
    pub actor: Option<String>,
    pub target: Option<String>,
    /// Most recent first.
    pub limit: Option<usize>,
    pub after_timestamp: Option<Millis>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action: None,
            actor: None,
            target: None,
            limit: Some(50),
            after_timestamp: None,
        }
    }
}

/// Filter entries, newest first.
pub fn query_audit_log(entries: &[AuditEntry], query: &AuditQuery) -> Vec<AuditEntry> {
    let mut filtered: Vec<AuditEntry> = entries
        .iter()
        .filter(|entry| {
            if let Some(ref action) = query.action {
                if &entry.action != action {
                    return false;
                }
            }

            if let Some(ref actor) = query.actor {
                if &entry.actor != actor {
                    return false;
                }
            }

            if let Some(ref target) = query.target {
                if &entry.target != target {
                    return false;
                }
            }

            if let Some(after_ts) = query.after_timestamp {
                if entry.timestamp <= after_ts {
                    return false;
                }
            }

            true
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}

/// Format entries for terminal display.
pub fn format_audit_log(entries: &[AuditEntry], now: Millis) -> String {
    if entries.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::from("📋 Admin Audit Trail\n\n");

    for entry in entries {
        output.push_str(&format!(
            "• {} | {} {} (by {})\n  {}\n\n",
            entry.relative_time(now),
            entry.action.display(),
            entry.target,
            entry.actor,
            entry.details
        ));
    }

    output.trim_end().to_string()
}

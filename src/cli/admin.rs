use super::config::RangerConfig;
use clap::Subcommand;
use rangerblock::clock;
use rangerblock::gatekeeper::audit_trail::format_audit_log;
use rangerblock::gatekeeper::{
    query_audit_log, AccessControlRegistry, AdminAction, AuditQuery, JsonFileStore, Role,
    SUPREME_USER_ID,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Ban a user from the network
    Ban {
        user_id: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Lift a ban
    Unban { user_id: String },

    /// Stop a user from sending messages for a while
    Timeout {
        user_id: String,

        /// Duration, e.g. "10m", "1h 30m"
        #[arg(value_parser = humantime::parse_duration)]
        duration: Duration,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Clear a timeout early
    Untimeout { user_id: String },

    /// Assign a role (admin, mod, user)
    Role { user_id: String, role: Role },

    /// Show a user's role, ban and timeout status
    Check { user_id: String },

    /// Show the admin audit trail
    Audit {
        /// Filter by action (ban, unban, timeout, clear_timeout, set_role)
        #[arg(long, value_parser = parse_action)]
        action: Option<AdminAction>,

        /// Filter by acting admin
        #[arg(long)]
        actor: Option<String>,

        /// Filter by affected user
        #[arg(long)]
        target: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn parse_action(s: &str) -> Result<AdminAction, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("Unknown action: {}", s))
}

/// Run an admin command against the access tables
///
/// `actor` defaults to the supreme identity: whoever can write the admin data
/// directory already has full control of it.
pub fn execute(
    config: &RangerConfig,
    actor: Option<String>,
    command: AdminCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = AccessControlRegistry::new(
        Arc::new(JsonFileStore::new(config.access_dir())),
        clock::system(),
    );
    let actor = actor.unwrap_or_else(|| SUPREME_USER_ID.to_string());
    println!("{}", run(&registry, &actor, command)?);
    Ok(())
}

/// Apply `command` and return the text to show.
pub fn run(
    registry: &AccessControlRegistry,
    actor: &str,
    command: AdminCommand,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match command {
        AdminCommand::Ban { user_id, reason } => {
            registry.ban(actor, &user_id, reason)?;
            format!("🚫 Banned {}", user_id)
        }
        AdminCommand::Unban { user_id } => {
            if registry.unban(actor, &user_id)? {
                format!("✅ Unbanned {}", user_id)
            } else {
                format!("{} was not banned", user_id)
            }
        }
        AdminCommand::Timeout {
            user_id,
            duration,
            reason,
        } => {
            registry.timeout(actor, &user_id, duration, reason)?;
            format!(
                "⏳ Timed out {} for {}",
                user_id,
                humantime::format_duration(duration)
            )
        }
        AdminCommand::Untimeout { user_id } => {
            if registry.clear_timeout(actor, &user_id)? {
                format!("✅ Cleared timeout for {}", user_id)
            } else {
                format!("{} was not timed out", user_id)
            }
        }
        AdminCommand::Role { user_id, role } => {
            registry.set_role(actor, &user_id, role)?;
            format!("{} {} is now {}", role.info().icon, user_id, role.info().name)
        }
        AdminCommand::Check { user_id } => describe(registry, &user_id),
        AdminCommand::Audit {
            action,
            actor,
            target,
            limit,
        } => {
            let entries = registry.store().audit_entries()?;
            let query = AuditQuery {
                action,
                actor,
                target,
                limit: Some(limit),
                after_timestamp: None,
            };
            format_audit_log(&query_audit_log(&entries, &query), registry.now())
        }
    };
    Ok(output)
}

fn describe(registry: &AccessControlRegistry, user_id: &str) -> String {
    let info = registry.role_info(user_id);
    let mut lines = vec![format!("{} {} ({})", info.icon, user_id, info.name)];

    let connect = registry.can_connect(user_id);
    let message = registry.can_message(user_id);
    lines.push(format!(
        "  Connect: {}",
        connect.reason.as_deref().unwrap_or("allowed")
    ));
    lines.push(format!(
        "  Message: {}",
        message.reason.as_deref().unwrap_or("allowed")
    ));

    if let Some(ban) = registry.ban_entry(user_id) {
        if let Some(by) = ban.banned_by {
            lines.push(format!("  Banned by: {}", by));
        }
    }
    if let Some(timeout) = registry.active_timeout(user_id) {
        let left_secs = timeout.expires_at.saturating_sub(registry.now()) / 1000;
        lines.push(format!(
            "  Timeout ends in: {}",
            humantime::format_duration(Duration::from_secs(left_secs))
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangerblock::clock::ManualClock;
    use rangerblock::gatekeeper::MemoryAccessStore;

    fn registry() -> (AccessControlRegistry, ManualClock) {
        let clock = ManualClock::new(1_800_000_000_000);
        let registry = AccessControlRegistry::new(
            Arc::new(MemoryAccessStore::new()),
            Arc::new(clock.clone()),
        );
        (registry, clock)
    }

    #[test]
    fn test_ban_check_unban() {
        let (registry, _clock) = registry();

        let out = run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Ban {
                user_id: "rb_spam".to_string(),
                reason: Some("flooding".to_string()),
            },
        )
        .unwrap();
        assert!(out.contains("Banned rb_spam"));

        let out = run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Check {
                user_id: "rb_spam".to_string(),
            },
        )
        .unwrap();
        assert!(out.contains("You are banned from this network."));

        let out = run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Unban {
                user_id: "rb_spam".to_string(),
            },
        )
        .unwrap();
        assert!(out.contains("Unbanned"));
    }

    #[test]
    fn test_supreme_cannot_be_banned() {
        let (registry, _clock) = registry();
        let err = run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Ban {
                user_id: SUPREME_USER_ID.to_string(),
                reason: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("supreme"));
    }

    #[test]
    fn test_plain_user_cannot_act() {
        let (registry, _clock) = registry();
        let result = run(
            &registry,
            "rb_nobody",
            AdminCommand::Timeout {
                user_id: "rb_other".to_string(),
                duration: Duration::from_secs(600),
                reason: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_audit_lists_actions() {
        let (registry, _clock) = registry();
        run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Role {
                user_id: "rb_mod".to_string(),
                role: Role::Mod,
            },
        )
        .unwrap();
        run(
            &registry,
            "rb_mod",
            AdminCommand::Timeout {
                user_id: "rb_loud".to_string(),
                duration: Duration::from_secs(600),
                reason: Some("caps".to_string()),
            },
        )
        .unwrap();

        let out = run(
            &registry,
            SUPREME_USER_ID,
            AdminCommand::Audit {
                action: Some(AdminAction::Timeout),
                actor: None,
                target: None,
                limit: 10,
            },
        )
        .unwrap();
        assert!(out.contains("Timeout rb_loud (by rb_mod)"));
        assert!(out.contains("10m: caps"));
        assert!(!out.contains("Set Role"));
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("clear_timeout"), Ok(AdminAction::ClearTimeout));
        assert_eq!(parse_action("BAN"), Ok(AdminAction::Ban));
        assert!(parse_action("nuke").is_err());
    }
}

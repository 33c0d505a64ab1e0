use super::config::RangerConfig;
use rangerblock::clock;
use rangerblock::ledger::LedgerStore;
use rangerblock::registration::{
    Action, FileRegistrationStore, RegistrationSummary, RegistrationWorkflow,
};
use rangerblock::relay::WebSocketRelayConnector;
use std::sync::Arc;

/// Show registration and ledger status
///
/// Reads local state only; nothing is sent to the relay.
pub fn execute(config: &RangerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let workflow = RegistrationWorkflow::new(
        Arc::new(FileRegistrationStore::new(config.registration_dir())),
        Arc::new(WebSocketRelayConnector::new()),
        clock::system(),
        config.submit_settings(),
    );

    println!("📊 RangerBlock Status");
    println!();
    println!("{}", describe_registration(&workflow.get_summary()));

    let allowed: Vec<&str> = [
        Action::Chat,
        Action::Voice,
        Action::Video,
        Action::Files,
        Action::Dm,
        Action::Channels,
        Action::View,
        Action::Register,
        Action::Exit,
    ]
    .into_iter()
    .filter(|a| workflow.can_perform_action(*a))
    .map(|a| a.as_str())
    .collect();
    println!("  Allowed: {}", allowed.join(", "));
    if let Some(block) = workflow.get_registration() {
        if !block.relay_acknowledged {
            println!("  ⚠️  Not yet acknowledged by a relay (run `rangerblock register --resync`)");
        }
    }

    println!();
    let store = LedgerStore::new(config.ledger_path());
    match store.load()? {
        Some(snapshot) => {
            println!("Ledger: {}", store.path().display());
            println!("  Blocks: {}", snapshot.chain.len());
            println!("  Pending: {}", snapshot.pending.len());
            println!("  Difficulty: {}", snapshot.difficulty);
        }
        None => println!("Ledger: none yet ({})", store.path().display()),
    }

    Ok(())
}

pub fn describe_registration(summary: &RegistrationSummary) -> String {
    let Some(status) = summary.status else {
        return "Registration: not registered".to_string();
    };

    let mut lines = vec![format!("Registration: {}", status)];
    if let Some(username) = &summary.username {
        lines.push(format!("  Username: {}", username));
    }
    if let Some(app_type) = &summary.app_type {
        lines.push(format!("  App: {}", app_type));
    }
    for (label, at) in [
        ("Registered", summary.registered_at),
        ("Submitted", summary.submitted_at),
        ("Approved", summary.approved_at),
    ] {
        if let Some(at) = at {
            lines.push(format!("  {}: {}", label, format_time(at)));
        }
    }
    lines.join("\n")
}

fn format_time(millis: u64) -> String {
    humantime::format_rfc3339_seconds(
        std::time::UNIX_EPOCH + std::time::Duration::from_millis(millis),
    )
    .to_string()
}

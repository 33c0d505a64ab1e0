//! Registration status machine and the per-status permission table.
//!
//! ```text
//! pending ──► approved ──► revoked
//!    │
//!    └──────► denied
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Denied,
    Revoked,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Denied => "denied",
            RegistrationStatus::Revoked => "revoked",
        }
    }

    /// Whether an admin decision may move a registration from `self` to `next`.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Denied) | (Approved, Revoked)
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown registration status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RegistrationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "denied" => Ok(RegistrationStatus::Denied),
            "revoked" => Ok(RegistrationStatus::Revoked),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Things a peer may try to do, gated on registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Chat,
    Voice,
    Video,
    Files,
    Dm,
    Channels,
    View,
    Register,
    Exit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Chat => "chat",
            Action::Voice => "voice",
            Action::Video => "video",
            Action::Files => "files",
            Action::Dm => "dm",
            Action::Channels => "channels",
            Action::View => "view",
            Action::Register => "register",
            Action::Exit => "exit",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Action::Chat),
            "voice" => Ok(Action::Voice),
            "video" => Ok(Action::Video),
            "files" => Ok(Action::Files),
            "dm" => Ok(Action::Dm),
            "channels" => Ok(Action::Channels),
            "view" => Ok(Action::View),
            "register" => Ok(Action::Register),
            "exit" => Ok(Action::Exit),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}

/// Permission table. `None` means no registration exists yet.
pub fn can_perform(status: Option<RegistrationStatus>, action: Action) -> bool {
    match status {
        Some(RegistrationStatus::Approved) => true,
        Some(RegistrationStatus::Pending) => matches!(action, Action::View | Action::Exit),
        Some(RegistrationStatus::Denied) | Some(RegistrationStatus::Revoked) => {
            action == Action::Exit
        }
        None => matches!(action, Action::Register | Action::Exit),
    }
}

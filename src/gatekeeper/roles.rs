//! Role definitions and privilege levels.
//!
//! Privilege comparisons go through [`Role::level`], never enum ordering, so
//! intermediate roles can be added without touching call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The supreme identity. Cannot be banned, timed out, or demoted by data.
pub const SUPREME_USER_ID: &str = "rb_c5d415076f04e989";

/// Minimum level for moderator actions.
pub const MOD_LEVEL: u8 = 50;

/// Minimum level for admin actions.
pub const ADMIN_LEVEL: u8 = 80;

/// Named privilege tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Supreme,
    Admin,
    Mod,
    User,
    Banned,
}

/// Display metadata for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleInfo {
    pub level: u8,
    pub name: &'static str,
    pub icon: &'static str,
}

impl Role {
    pub fn info(&self) -> RoleInfo {
        match self {
            Role::Supreme => RoleInfo {
                level: 100,
                name: "Supreme Admin",
                icon: "👑",
            },
            Role::Admin => RoleInfo {
                level: ADMIN_LEVEL,
                name: "Admin",
                icon: "🛡️",
            },
            Role::Mod => RoleInfo {
                level: MOD_LEVEL,
                name: "Moderator",
                icon: "⚔️",
            },
            Role::User => RoleInfo {
                level: 10,
                name: "User",
                icon: "👤",
            },
            Role::Banned => RoleInfo {
                level: 0,
                name: "Banned",
                icon: "🚫",
            },
        }
    }

    pub fn level(&self) -> u8 {
        self.info().level
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Supreme => "supreme",
            Role::Admin => "admin",
            Role::Mod => "mod",
            Role::User => "user",
            Role::Banned => "banned",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "supreme" => Ok(Role::Supreme),
            "admin" => Ok(Role::Admin),
            "mod" | "moderator" => Ok(Role::Mod),
            "user" => Ok(Role::User),
            "banned" => Ok(Role::Banned),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

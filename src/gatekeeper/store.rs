//! Access-control tables.
//!
//! Three flat keyed tables under the admin data directory, re-read on every
//! check so that an external admin tool takes effect immediately:
//!
//! | File | Key | Value |
//! |---|---|---|
//! | `users.json` | userId | [`UserRecord`] |
//! | `bans.json` | userId | [`BanEntry`] |
//! | `timeouts.json` | userId | [`TimeoutEntry`] |
//!
//! `audit.json` holds the append-only admin audit log.

use super::audit_trail::AuditEntry;
use crate::clock::Millis;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const USERS_FILE: &str = "users.json";
const BANS_FILE: &str = "bans.json";
const TIMEOUTS_FILE: &str = "timeouts.json";
const AUDIT_FILE: &str = "audit.json";

/// Stored role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Role name; unknown names resolve to `user`.
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Ban with no expiry; removal is explicit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub banned_by: Option<String>,
    #[serde(default)]
    pub banned_at: Option<Millis>,
}

/// Timeout, treated as absent once `expires_at` has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutEntry {
    pub expires_at: Millis,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub issued_by: Option<String>,
}

/// Access store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Backing storage for roles, bans, timeouts, and the audit log.
///
/// Injected into [`AccessControlRegistry`](super::AccessControlRegistry) so
/// tests can substitute [`MemoryAccessStore`].
pub trait AccessStore: Send + Sync {
    fn users(&self) -> Result<HashMap<String, UserRecord>, StoreError>;
    fn bans(&self) -> Result<HashMap<String, BanEntry>, StoreError>;
    fn timeouts(&self) -> Result<HashMap<String, TimeoutEntry>, StoreError>;

    fn put_user(&self, user_id: &str, record: UserRecord) -> Result<(), StoreError>;
    fn put_ban(&self, user_id: &str, entry: BanEntry) -> Result<(), StoreError>;
    /// Returns whether a ban existed.
    fn remove_ban(&self, user_id: &str) -> Result<bool, StoreError>;
    fn put_timeout(&self, user_id: &str, entry: TimeoutEntry) -> Result<(), StoreError>;
    /// Returns whether a timeout existed.
    fn remove_timeout(&self, user_id: &str) -> Result<bool, StoreError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
    fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError>;
}

/// JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, StoreError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(T::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
    }

    /// Write via temp file + rename so readers never see a torn table.
    fn save<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(file);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let contents = serde_json::to_string_pretty(value).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;

        let tmp = self.dir.join(format!("{}.tmp", file));
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn update<T, R>(&self, file: &str, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut table: T = self.load(file)?;
        let result = f(&mut table);
        self.save(file, &table)?;
        Ok(result)
    }
}

impl AccessStore for JsonFileStore {
    fn users(&self) -> Result<HashMap<String, UserRecord>, StoreError> {
        self.load(USERS_FILE)
    }

    fn bans(&self) -> Result<HashMap<String, BanEntry>, StoreError> {
        self.load(BANS_FILE)
    }

    fn timeouts(&self) -> Result<HashMap<String, TimeoutEntry>, StoreError> {
        self.load(TIMEOUTS_FILE)
    }

    fn put_user(&self, user_id: &str, record: UserRecord) -> Result<(), StoreError> {
        self.update(USERS_FILE, |t: &mut HashMap<String, UserRecord>| {
            t.insert(user_id.to_string(), record);
        })
    }

    fn put_ban(&self, user_id: &str, entry: BanEntry) -> Result<(), StoreError> {
        self.update(BANS_FILE, |t: &mut HashMap<String, BanEntry>| {
            t.insert(user_id.to_string(), entry);
        })
    }

    fn remove_ban(&self, user_id: &str) -> Result<bool, StoreError> {
        self.update(BANS_FILE, |t: &mut HashMap<String, BanEntry>| {
            t.remove(user_id).is_some()
        })
    }

    fn put_timeout(&self, user_id: &str, entry: TimeoutEntry) -> Result<(), StoreError> {
        self.update(TIMEOUTS_FILE, |t: &mut HashMap<String, TimeoutEntry>| {
            t.insert(user_id.to_string(), entry);
        })
    }

    fn remove_timeout(&self, user_id: &str) -> Result<bool, StoreError> {
        self.update(TIMEOUTS_FILE, |t: &mut HashMap<String, TimeoutEntry>| {
            t.remove(user_id).is_some()
        })
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.update(AUDIT_FILE, |log: &mut Vec<AuditEntry>| log.push(entry))
    }

    fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.load(AUDIT_FILE)
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    bans: HashMap<String, BanEntry>,
    timeouts: HashMap<String, TimeoutEntry>,
    audit: Vec<AuditEntry>,
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryAccessStore {
    tables: Mutex<Tables>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}

impl AccessStore for MemoryAccessStore {
    fn users(&self) -> Result<HashMap<String, UserRecord>, StoreError> {
        Ok(self.with(|t| t.users.clone()))
    }

    fn bans(&self) -> Result<HashMap<String, BanEntry>, StoreError> {
        Ok(self.with(|t| t.bans.clone()))
    }

    fn timeouts(&self) -> Result<HashMap<String, TimeoutEntry>, StoreError> {
        Ok(self.with(|t| t.timeouts.clone()))
    }

    fn put_user(&self, user_id: &str, record: UserRecord) -> Result<(), StoreError> {
        self.with(|t| t.users.insert(user_id.to_string(), record));
        Ok(())
    }

    fn put_ban(&self, user_id: &str, entry: BanEntry) -> Result<(), StoreError> {
        self.with(|t| t.bans.insert(user_id.to_string(), entry));
        Ok(())
    }

    fn remove_ban(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.with(|t| t.bans.remove(user_id).is_some()))
    }

    fn put_timeout(&self, user_id: &str, entry: TimeoutEntry) -> Result<(), StoreError> {
        self.with(|t| t.timeouts.insert(user_id.to_string(), entry));
        Ok(())
    }

    fn remove_timeout(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.with(|t| t.timeouts.remove(user_id).is_some()))
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.with(|t| t.audit.push(entry));
        Ok(())
    }

    fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.with(|t| t.audit.clone()))
    }
}

//! Local persistence of the single registration record.

use super::block::RegistrationBlock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const REGISTRATION_FILE: &str = "registration.json";

#[derive(Debug, thiserror::Error)]
pub enum RegistrationStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed registration record {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Storage for this installation's registration block.
pub trait RegistrationStore: Send + Sync {
    fn load(&self) -> Result<Option<RegistrationBlock>, RegistrationStoreError>;
    fn save(&self, block: &RegistrationBlock) -> Result<(), RegistrationStoreError>;
}

/// `registration.json` inside a directory.
#[derive(Debug, Clone)]
pub struct FileRegistrationStore {
    dir: PathBuf,
}

impl FileRegistrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(REGISTRATION_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RegistrationStore for FileRegistrationStore {
    fn load(&self) -> Result<Option<RegistrationBlock>, RegistrationStoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|source| RegistrationStoreError::Io {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| RegistrationStoreError::Parse { path, source })
    }

    fn save(&self, block: &RegistrationBlock) -> Result<(), RegistrationStoreError> {
        let path = self.path();
        let io_err = |source| RegistrationStoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let contents =
            serde_json::to_string_pretty(block).map_err(|source| RegistrationStoreError::Parse {
                path: path.clone(),
                source,
            })?;

        let tmp = self.dir.join(format!("{}.tmp", REGISTRATION_FILE));
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    block: Mutex<Option<RegistrationBlock>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistrationStore for MemoryRegistrationStore {
    fn load(&self) -> Result<Option<RegistrationBlock>, RegistrationStoreError> {
        Ok(self.block.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, block: &RegistrationBlock) -> Result<(), RegistrationStoreError> {
        *self.block.lock().unwrap_or_else(PoisonError::into_inner) = Some(block.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::registration::block::Consent;
    use tempfile::TempDir;

    fn block() -> RegistrationBlock {
        let identity = Identity {
            user_id: "rb_01".to_string(),
            public_key: "aa".to_string(),
            hardware_fingerprint_hash: "bb".to_string(),
            display_name: "Scout".to_string(),
            node_id: None,
            app_type: Some("chat".to_string()),
        };
        let consent = Consent {
            terms_version: "1.0".to_string(),
            terms_hash: "cc".to_string(),
            accepted_at: None,
            age_confirmed: true,
            signature: None,
        };
        RegistrationBlock::create(&identity, &consent, 7).unwrap()
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistrationStore::new(dir.path().join("registration"));

        assert_eq!(store.load().unwrap(), None);

        let block = block();
        store.save(&block).unwrap();
        assert!(store.path().exists());

        let reopened = FileRegistrationStore::new(dir.path().join("registration"));
        assert_eq!(reopened.load().unwrap(), Some(block));
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(REGISTRATION_FILE), "{").unwrap();

        let store = FileRegistrationStore::new(dir.path());
        assert!(matches!(
            store.load(),
            Err(RegistrationStoreError::Parse { .. })
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryRegistrationStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&block()).unwrap();
        assert!(store.load().unwrap().is_some());
    }
}

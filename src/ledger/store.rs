//! Ledger persistence as a single JSON document.

use super::chain::LedgerSnapshot;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LedgerStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed ledger file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `{chain, pending, difficulty, node_count, last_updated}` at a fixed path.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>, LedgerStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| LedgerStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| LedgerStoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerStoreError> {
        let io_err = |source| LedgerStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents =
            serde_json::to_string_pretty(snapshot).map_err(|source| LedgerStoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

//! Background proof-of-work.
//!
//! Mining runs on tokio's blocking pool so the runtime stays responsive. The
//! handle exposes attempt count and cooperative cancellation.

use super::block::Block;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Miner;

impl Miner {
    /// Start mining `candidate` at `difficulty`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut candidate: Block, difficulty: usize) -> MiningHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicU64::new(0));

        let task = {
            let cancel = Arc::clone(&cancel);
            let attempts = Arc::clone(&attempts);
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let found = candidate.mine_until(difficulty, &cancel, &attempts);
                debug!(
                    index = candidate.index,
                    found,
                    attempts = attempts.load(Ordering::Relaxed),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "mining finished"
                );
                found.then_some(candidate)
            })
        };

        MiningHandle {
            cancel,
            attempts,
            task,
        }
    }
}

pub struct MiningHandle {
    cancel: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
    task: JoinHandle<Option<Block>>,
}

impl MiningHandle {
    /// Hashes tried so far (updated in batches).
    pub fn progress(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for a mined block.
    pub async fn wait(self) -> Result<Block, MiningError> {
        match self.task.await? {
            Some(block) => Ok(block),
            None => Err(MiningError::Cancelled {
                attempts: self.attempts.load(Ordering::Relaxed),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::block::{meets_difficulty, Transaction};

    fn candidate() -> Block {
        Block::new(
            1,
            1_700_000_000_000,
            vec![Transaction::new("Network", "Miner", 100.0, None)],
            "0".repeat(64),
        )
    }

    #[tokio::test]
    async fn test_spawned_miner_finds_block() {
        let handle = Miner::spawn(candidate(), 2);
        let block = handle.wait().await.unwrap();
        assert!(meets_difficulty(&block.hash, 2));
        assert!(block.has_valid_hash());
    }

    #[tokio::test]
    async fn test_cancel_stops_unreachable_work() {
        let handle = Miner::spawn(candidate(), 64);
        handle.cancel();
        match handle.wait().await {
            Err(MiningError::Cancelled { attempts }) => assert!(attempts > 0),
            other => panic!("expected cancellation, got {:?}", other.map(|b| b.hash)),
        }
    }
}

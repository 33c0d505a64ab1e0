//! The ledger: an append-only, hash-linked, proof-of-work chain.
//!
//! Transactions wait in a pending pool until a block is mined. There is no
//! balance check at submission, so an address can go negative.

use super::block::{meets_difficulty, Block, Transaction};
use crate::clock::{Clock, Millis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_DIFFICULTY: usize = 4;
pub const MIN_DIFFICULTY: usize = 1;
pub const MAX_DIFFICULTY: usize = 6;
pub const DEFAULT_MINING_REWARD: f64 = 100.0;

/// Sender of reward transactions.
pub const NETWORK_ADDRESS: &str = "Network";
pub const GENESIS_ADDRESS: &str = "Genesis";

/// Fixed so that every node derives the same genesis hash.
pub const GENESIS_TIMESTAMP: Millis = 1_700_000_000_000;
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub difficulty: usize,
    pub mining_reward: f64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
        }
    }
}

/// First integrity failure found while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid hash at block {index}")]
    HashMismatch { index: u64 },

    #[error("Broken chain at block {index}")]
    BrokenLink { index: u64 },

    #[error("Invalid proof of work at block {index}")]
    InsufficientWork { index: u64 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid transaction: sender and recipient required")]
    MissingParty,

    #[error("Invalid transaction: amount must be positive (got {0})")]
    InvalidAmount(f64),

    #[error("Invalid difficulty {0} (must be {MIN_DIFFICULTY}-{MAX_DIFFICULTY})")]
    InvalidDifficulty(usize),

    #[error("No minable block at index {0}")]
    NoSuchBlock(u64),

    #[error("Block {index} does not extend the chain tip")]
    StaleBlock { index: u64 },

    #[error("Block rejected: {0}")]
    Rejected(ChainError),

    #[error("Ledger snapshot has no genesis block")]
    EmptyChain,
}

/// Serializable ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub difficulty: usize,
    pub node_count: u64,
    pub last_updated: Millis,
}

pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: usize,
    mining_reward: f64,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// Fresh ledger holding only the genesis block.
    pub fn new(settings: LedgerSettings, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        check_difficulty(settings.difficulty)?;
        Ok(Self {
            chain: vec![genesis_block()],
            pending: Vec::new(),
            difficulty: settings.difficulty,
            mining_reward: settings.mining_reward,
            clock,
        })
    }

    /// Restore from a snapshot. Integrity is not checked here; call
    /// [`validate_chain`](Self::validate_chain).
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        mining_reward: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        if snapshot.chain.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        check_difficulty(snapshot.difficulty)?;

        Ok(Self {
            chain: snapshot.chain,
            pending: snapshot.pending,
            difficulty: snapshot.difficulty,
            mining_reward,
            clock,
        })
    }

    pub fn snapshot(&self, node_count: u64) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.clone(),
            pending: self.pending.clone(),
            difficulty: self.difficulty,
            node_count,
            last_updated: self.clock.now_millis(),
        }
    }

    /// Queue a transaction for the next block.
    pub fn create_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<(), LedgerError> {
        if sender.is_empty() || recipient.is_empty() {
            return Err(LedgerError::MissingParty);
        }
        // Also rejects NaN
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(LedgerError::InvalidAmount(amount));
        }

        self.pending.push(Transaction::new(
            sender,
            recipient,
            amount,
            Some(self.clock.now_millis()),
        ));
        Ok(())
    }

    /// Unmined block of all pending transactions plus the mining reward.
    pub fn candidate_block(&self, reward_address: &str) -> Block {
        let mut transactions = self.pending.clone();
        transactions.push(Transaction::new(
            NETWORK_ADDRESS,
            reward_address,
            self.mining_reward,
            None,
        ));

        Block::new(
            self.chain.len() as u64,
            self.clock.now_millis(),
            transactions,
            self.latest_block().hash.clone(),
        )
    }

    /// Append a block mined elsewhere, dropping its transactions from the pool.
    pub fn commit_block(&mut self, block: Block) -> Result<&Block, LedgerError> {
        let tip = self.latest_block();
        if block.index != self.chain.len() as u64 {
            return Err(LedgerError::StaleBlock { index: block.index });
        }
        if block.previous_hash != tip.hash {
            return Err(LedgerError::Rejected(ChainError::BrokenLink { index: block.index }));
        }
        if !block.has_valid_hash() {
            return Err(LedgerError::Rejected(ChainError::HashMismatch { index: block.index }));
        }
        if !meets_difficulty(&block.hash, self.difficulty) {
            return Err(LedgerError::Rejected(ChainError::InsufficientWork {
                index: block.index,
            }));
        }

        for tx in &block.transactions {
            if let Some(pos) = self.pending.iter().position(|p| p == tx) {
                self.pending.remove(pos);
            }
        }

        info!(
            index = block.index,
            nonce = block.nonce,
            hash = %block.hash,
            transactions = block.transactions.len(),
            "block mined"
        );
        self.chain.push(block);
        Ok(self.latest_block())
    }

    /// Mine pending transactions on the calling thread.
    ///
    /// CPU-bound and blocking; use [`Miner`](super::Miner) from async code.
    pub fn mine_pending_transactions(&mut self, reward_address: &str) -> Result<&Block, LedgerError> {
        let mut block = self.candidate_block(reward_address);
        block.mine(self.difficulty);
        self.commit_block(block)
    }

    /// Sum of incoming minus outgoing amounts over the whole chain.
    pub fn get_balance_of_address(&self, address: &str) -> f64 {
        self.chain
            .iter()
            .flat_map(|block| &block.transactions)
            .fold(0.0, |mut balance, tx| {
                if tx.sender == address {
                    balance -= tx.amount;
                }
                if tx.recipient == address {
                    balance += tx.amount;
                }
                balance
            })
    }

    pub fn is_chain_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }

    /// Walk the chain and report the first failing block.
    pub fn validate_chain(&self) -> Result<(), ChainError> {
        let result = self.check_chain();
        if let Err(e) = &result {
            warn!(error = %e, "chain invalid");
        }
        result
    }

    fn check_chain(&self) -> Result<(), ChainError> {
        let Some(genesis) = self.chain.first() else {
            return Ok(());
        };
        if !genesis.has_valid_hash() {
            return Err(ChainError::HashMismatch { index: 0 });
        }

        for pair in self.chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            if !current.has_valid_hash() {
                return Err(ChainError::HashMismatch {
                    index: current.index,
                });
            }
            if current.previous_hash != previous.hash {
                return Err(ChainError::BrokenLink {
                    index: current.index,
                });
            }
            if !meets_difficulty(&current.hash, self.difficulty) {
                return Err(ChainError::InsufficientWork {
                    index: current.index,
                });
            }
        }

        Ok(())
    }

    /// Overwrite the first transaction amount of a mined block without
    /// re-mining. Exists only to demonstrate tamper detection.
    pub fn tamper_with_block(&mut self, index: u64, amount: f64) -> Result<(), LedgerError> {
        if index == 0 {
            return Err(LedgerError::NoSuchBlock(index));
        }
        let tx = self
            .chain
            .get_mut(index as usize)
            .and_then(|block| block.transactions.first_mut())
            .ok_or(LedgerError::NoSuchBlock(index))?;

        warn!(index, amount, "tampering with block");
        tx.amount = amount;
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: usize) -> Result<(), LedgerError> {
        check_difficulty(difficulty)?;
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn latest_block(&self) -> &Block {
        // Never empty: constructors guarantee a genesis block
        &self.chain[self.chain.len() - 1]
    }
}

fn check_difficulty(difficulty: usize) -> Result<(), LedgerError> {
    if (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        Ok(())
    } else {
        Err(LedgerError::InvalidDifficulty(difficulty))
    }
}

/// Fixed genesis block: one zero-amount system transaction, not mined.
pub fn genesis_block() -> Block {
    Block::new(
        0,
        GENESIS_TIMESTAMP,
        vec![Transaction::new(GENESIS_ADDRESS, NETWORK_ADDRESS, 0.0, None)],
        GENESIS_PREVIOUS_HASH.to_string(),
    )
}

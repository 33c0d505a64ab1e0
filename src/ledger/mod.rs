//! Proof-of-work ledger.
//!
//! - Block: hash layout and nonce search
//! - Chain: pending pool, balances, validation, tamper demo
//! - Miner: cancellable mining off the async runtime
//! - Store: JSON persistence

pub mod block;
pub mod chain;
pub mod miner;
pub mod store;

pub use block::{meets_difficulty, Block, Transaction};
pub use chain::{
    genesis_block, ChainError, Ledger, LedgerError, LedgerSettings, LedgerSnapshot,
    DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, MAX_DIFFICULTY, MIN_DIFFICULTY, NETWORK_ADDRESS,
};
pub use miner::{Miner, MiningError, MiningHandle};
pub use store::{LedgerStore, LedgerStoreError};

//! Ledger blocks and transactions.
//!
//! Block hash: `SHA256(index ‖ previousHash ‖ timestamp ‖ JSON(transactions) ‖ nonce)`,
//! hex-encoded. Proof-of-work requires `difficulty` leading `'0'` hex digits.

use crate::clock::Millis;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Attempts between cancellation checks while mining.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    /// Absent on genesis and reward transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Millis>,
}

impl Transaction {
    pub fn new(sender: &str, recipient: &str, amount: f64, timestamp: Option<Millis>) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: Millis,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// New unmined block with its hash computed at nonce 0.
    pub fn new(
        index: u64,
        timestamp: Millis,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn calculate_hash(&self) -> String {
        hash_with_nonce(&self.hash_prefix(), self.nonce)
    }

    /// Everything hashed except the nonce.
    fn hash_prefix(&self) -> String {
        // Vec of plain structs; serialization cannot fail
        let transactions = serde_json::to_string(&self.transactions).unwrap_or_default();
        format!(
            "{}{}{}{}",
            self.index, self.previous_hash, self.timestamp, transactions
        )
    }

    /// Stored hash matches contents.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Blocking proof-of-work.
    pub fn mine(&mut self, difficulty: usize) {
        let never = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        self.mine_until(difficulty, &never, &attempts);
    }

    /// Proof-of-work that stops early when `cancel` is set. Returns whether a
    /// valid nonce was found. `attempts` is bumped as hashes are tried.
    pub fn mine_until(
        &mut self,
        difficulty: usize,
        cancel: &AtomicBool,
        attempts: &AtomicU64,
    ) -> bool {
        let prefix = self.hash_prefix();
        let mut nonce = self.nonce;
        let mut hash = hash_with_nonce(&prefix, nonce);
        let mut since_check = 0u64;

        while !meets_difficulty(&hash, difficulty) {
            nonce += 1;
            hash = hash_with_nonce(&prefix, nonce);

            since_check += 1;
            if since_check == CANCEL_CHECK_INTERVAL {
                attempts.fetch_add(since_check, Ordering::Relaxed);
                since_check = 0;
                if cancel.load(Ordering::Relaxed) {
                    self.nonce = nonce;
                    self.hash = hash;
                    return false;
                }
            }
        }

        attempts.fetch_add(since_check + 1, Ordering::Relaxed);
        self.nonce = nonce;
        self.hash = hash;
        true
    }
}

fn hash_with_nonce(prefix: &str, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// `hash` starts with `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

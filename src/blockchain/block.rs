use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::hash;
use super::payload::Payload;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the blockchain
///
/// Fields are only writable inside the `blockchain` module. Once the miner
/// seals a block it is handed to the chain and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Index of the block in the chain
    pub(super) index: u64,

    /// Creation time as fractional unix seconds
    pub(super) timestamp: f64,

    /// The sealed payload
    pub(super) data: Payload,

    /// Hash of the previous block
    pub(super) previous_hash: String,

    /// Proof of work
    pub(super) nonce: u64,

    /// Hash of this block over all the fields above
    pub(super) hash: String,
}

/// Current time as fractional unix seconds
fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl Block {
    /// Creates the genesis block
    ///
    /// The genesis block is hashed but never mined.
    ///
    /// # Returns
    ///
    /// The genesis block, or the serialization error from hashing
    pub fn genesis() -> Result<Self, serde_json::Error> {
        let mut block = Block {
            index: 0,
            timestamp: now(),
            data: Payload::genesis(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Creates an unsealed block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `previous_hash` - The hash of the current chain tail
    /// * `data` - The payload to seal
    ///
    /// # Returns
    ///
    /// A draft with nonce 0 and an empty hash; pass it to the miner
    pub fn draft(index: u64, previous_hash: String, data: Payload) -> Self {
        Block {
            index,
            timestamp: now(),
            data,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Calculates the hash of the block from its current field values
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hash::digest(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Checks that the stored hash matches the block's contents
    pub fn is_valid_self(&self) -> bool {
        match self.compute_hash() {
            Ok(hash) => hash == self.hash,
            Err(_) => false,
        }
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        hash::meets_difficulty(&self.hash, difficulty)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

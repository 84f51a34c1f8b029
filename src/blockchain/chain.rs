use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info};
use thiserror::Error;

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use super::chapters::Chapter;
use super::miner::Miner;
use super::payload::Payload;
use super::storage::{LedgerStorage, StorageError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Invalid chain at block {index}: {reason}")]
    InvalidChain { index: u64, reason: String },
}

/// Represents the blockchain
///
/// Appends are serialized by `append_lock`, held from the tail read through
/// mining to the commit, so two appends can never mine against the same
/// tail. The block list itself is write-locked only for the final push and
/// stays readable while a block is being mined.
#[derive(Debug)]
pub struct Blockchain {
    /// The chain of blocks
    blocks: RwLock<Vec<Block>>,

    /// Held by the single in-flight append
    append_lock: Mutex<()>,

    /// Proof of work with the chain's fixed difficulty
    miner: Miner,

    /// Storage for blockchain data
    storage: Option<Arc<LedgerStorage>>,
}

impl Blockchain {
    /// Creates a new in-memory blockchain holding only the genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Leading zero hex characters required of mined blocks
    pub fn new(difficulty: usize) -> Result<Self, ChainError> {
        Ok(Self::from_blocks(vec![Block::genesis()?], difficulty, None))
    }

    /// Creates a blockchain backed by persistent storage
    ///
    /// Loads the stored chain, or creates and saves a genesis block if the
    /// storage is empty. A loaded chain that fails verification is logged
    /// and kept as-is.
    pub fn with_storage(storage: Arc<LedgerStorage>, difficulty: usize) -> Result<Self, ChainError> {
        let mut blocks = storage.load_blocks()?;

        if blocks.is_empty() {
            info!("No existing blockchain found in storage, creating genesis block");
            blocks.push(Block::genesis()?);
            storage.save_chain(&blocks)?;
        } else {
            info!("Loaded {} blocks from storage", blocks.len());
        }

        let blockchain = Self::from_blocks(blocks, difficulty, Some(storage));

        if let Err(err) = blockchain.verify() {
            error!("Stored blockchain failed validation: {}", err);
        }

        Ok(blockchain)
    }

    fn from_blocks(blocks: Vec<Block>, difficulty: usize, storage: Option<Arc<LedgerStorage>>) -> Self {
        Blockchain {
            blocks: RwLock::new(blocks),
            append_lock: Mutex::new(()),
            miner: Miner::new(difficulty),
            storage,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Block>> {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Block>> {
        self.blocks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_append(&self) -> MutexGuard<'_, ()> {
        self.append_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Caller must hold `append_lock` so the tail cannot move
    fn next_draft(&self, payload: Payload) -> Block {
        let blocks = self.read();
        let (index, previous_hash) = match blocks.last() {
            Some(tail) => (tail.index + 1, tail.hash.clone()),
            None => (0, GENESIS_PREVIOUS_HASH.to_string()),
        };
        Block::draft(index, previous_hash, payload)
    }

    // Persists first so a failed write leaves memory untouched
    fn commit(&self, block: Block) -> Result<Block, ChainError> {
        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
            info!("Saved block {} to storage", block.index);
        }

        self.write().push(block.clone());
        Ok(block)
    }

    /// Mines a new block holding `payload` and appends it to the chain
    ///
    /// # Returns
    ///
    /// The sealed block
    pub fn append(&self, payload: Payload) -> Result<Block, ChainError> {
        self.append_with_progress(payload, |_| {})
    }

    /// Like [`Blockchain::append`], reporting mining attempts to `on_progress`
    pub fn append_with_progress<F>(&self, payload: Payload, on_progress: F) -> Result<Block, ChainError>
    where
        F: FnMut(u64),
    {
        let _append = self.lock_append();

        let draft = self.next_draft(payload);
        let block = self.miner.seal_with_progress(draft, on_progress)?;
        self.commit(block)
    }

    /// Like [`Blockchain::append`], giving up if `cancel` is raised first
    ///
    /// # Returns
    ///
    /// `Ok(None)` if mining was cancelled; the chain is then unchanged
    pub fn append_until(&self, payload: Payload, cancel: &AtomicBool) -> Result<Option<Block>, ChainError> {
        let _append = self.lock_append();

        let draft = self.next_draft(payload);
        match self.miner.seal_until(draft, cancel)? {
            Some(block) => self.commit(block).map(Some),
            None => Ok(None),
        }
    }

    /// Appends one text block per chapter, in order
    pub fn append_chapters<I>(&self, chapters: I) -> Result<Vec<Block>, ChainError>
    where
        I: IntoIterator<Item = Chapter>,
    {
        let mut sealed = Vec::new();

        for chapter in chapters {
            let payload = chapter.into_payload();
            if let Payload::QuranText { surah_number, surah_name, .. } = &payload {
                info!("Processing Surah: {} (Chapter {})", surah_name, surah_number);
            }
            sealed.push(self.append(payload)?);
        }

        Ok(sealed)
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if every block hashes to its stored hash and links to its predecessor
    pub fn validate(&self) -> bool {
        self.verify().is_ok()
    }

    /// Validates the blockchain, reporting the first failure
    ///
    /// Never repairs anything; the chain is left exactly as it was.
    pub fn verify(&self) -> Result<(), ChainError> {
        let blocks = self.read();

        let Some(genesis) = blocks.first() else {
            return Err(ChainError::InvalidChain {
                index: 0,
                reason: "chain is empty".to_string(),
            });
        };

        if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(ChainError::InvalidChain {
                index: 0,
                reason: "genesis block must have index 0 and previous hash \"0\"".to_string(),
            });
        }

        if !genesis.is_valid_self() {
            return Err(ChainError::InvalidChain {
                index: 0,
                reason: "hash does not match block contents".to_string(),
            });
        }

        for pair in blocks.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            if current.index != previous.index + 1 {
                return Err(ChainError::InvalidChain {
                    index: current.index,
                    reason: format!("expected index {}", previous.index + 1),
                });
            }

            if !current.is_valid_self() {
                return Err(ChainError::InvalidChain {
                    index: current.index,
                    reason: "hash does not match block contents".to_string(),
                });
            }

            if current.previous_hash != previous.hash {
                return Err(ChainError::InvalidChain {
                    index: current.index,
                    reason: "previous hash does not match predecessor".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Writes the whole chain to storage as one snapshot
    pub fn save(&self) -> Result<(), ChainError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let blocks = self.read();
        storage.save_chain(&blocks)?;
        Ok(())
    }

    /// Gets the entire blockchain
    pub fn blocks(&self) -> Vec<Block> {
        self.read().clone()
    }

    /// Gets a block by its index
    pub fn block(&self, index: u64) -> Option<Block> {
        let blocks = self.read();
        usize::try_from(index).ok().and_then(|i| blocks.get(i)).cloned()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Option<Block> {
        self.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn difficulty(&self) -> usize {
        self.miner.difficulty()
    }

    #[cfg(test)]
    fn with_block_mut<F: FnOnce(&mut Block)>(&self, index: usize, f: F) {
        f(&mut self.write()[index]);
    }
}

use std::path::Path;

use log::{info, warn};
use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::wallet::Wallet;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Durable storage for the chain and the wallet store
///
/// Values are the JSON records of blocks and wallets. Blocks are keyed by
/// big-endian index so a tree scan yields them in chain order.
pub struct LedgerStorage {
    /// The database instance
    db: Db,

    /// Tree for blocks
    blocks: Tree,

    /// Tree for wallets, keyed by username
    wallets: Tree,

    /// Tree for metadata
    metadata: Tree,
}

impl std::fmt::Debug for LedgerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStorage").finish()
    }
}

impl LedgerStorage {
    /// Opens (or creates) the storage at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a throwaway database that is removed when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree("blocks")?;
        let wallets = db.open_tree("wallets")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks,
            wallets,
            metadata,
        })
    }

    /// Saves a single block and advances the stored height
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = serde_json::to_vec(block)?;

        self.blocks.insert(block.index().to_be_bytes(), value)?;
        self.metadata.insert("block_height", block.index().to_be_bytes().to_vec())?;
        self.flush()
    }

    /// Replaces the stored chain with `blocks` in one atomic batch
    pub fn save_chain(&self, blocks: &[Block]) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        for key in self.blocks.iter().keys() {
            batch.remove(key?);
        }
        for block in blocks {
            batch.insert(block.index().to_be_bytes().to_vec(), serde_json::to_vec(block)?);
        }

        self.blocks.apply_batch(batch)?;
        if let Some(last) = blocks.last() {
            self.metadata.insert("block_height", last.index().to_be_bytes().to_vec())?;
        }
        self.flush()?;

        info!("Saved chain of {} blocks to storage", blocks.len());
        Ok(())
    }

    /// Loads every stored block in index order
    pub fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        for entry in self.blocks.iter() {
            let (_, value) = entry?;
            blocks.push(serde_json::from_slice::<Block>(&value)?);
        }

        Ok(blocks)
    }

    /// Gets a block by its index
    pub fn get_block(&self, index: u64) -> Result<Block, StorageError> {
        match self.blocks.get(index.to_be_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(StorageError::NotFound(format!("Block {} not found", index))),
        }
    }

    /// Gets the index of the last saved block
    pub fn block_height(&self) -> Result<Option<u64>, StorageError> {
        let Some(value) = self.metadata.get("block_height")? else {
            return Ok(None);
        };

        match <[u8; 8]>::try_from(value.as_ref()) {
            Ok(bytes) => Ok(Some(u64::from_be_bytes(bytes))),
            Err(_) => {
                warn!("Ignoring malformed block height in metadata");
                Ok(None)
            }
        }
    }

    /// Writes every wallet in one atomic batch
    pub fn save_wallets(&self, wallets: &[Wallet]) -> Result<(), StorageError> {
        let mut batch = Batch::default();
        for wallet in wallets {
            batch.insert(wallet.username.as_bytes(), serde_json::to_vec(wallet)?);
        }

        self.wallets.apply_batch(batch)?;
        self.flush()
    }

    /// Loads every stored wallet
    pub fn load_wallets(&self) -> Result<Vec<Wallet>, StorageError> {
        let mut wallets = Vec::new();

        for entry in self.wallets.iter() {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice::<Wallet>(&value)?);
        }

        Ok(wallets)
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

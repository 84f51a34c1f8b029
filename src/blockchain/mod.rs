// Blockchain module
//
// This module contains the ledger core:
// - Canonical block hashing and proof of work mining
// - Block and chain structures with integrity validation
// - Wallet store and reward book
// - Persistent storage and the collaborator datasets (chapters, locations)

pub mod block;
pub mod chain;
pub mod chapters;
pub mod hash;
pub mod location;
pub mod miner;
pub mod payload;
pub mod rewards;
pub mod storage;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::Blockchain;
pub use chapters::Chapter;
pub use location::{Coordinates, LocationDirectory};
pub use payload::Payload;
pub use rewards::{RewardBook, RewardEntry, RewardError};
pub use storage::LedgerStorage;
pub use wallet::{Currency, Wallet, WalletError, WalletStore};

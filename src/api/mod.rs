// API module
//
// This module exposes the ledger to HTTP collaborators

pub mod handlers;
pub mod routes;

use crate::blockchain::{Blockchain, LocationDirectory, RewardBook, WalletStore};

// Re-export main components for easier access
pub use routes::configure_routes;

/// Everything a request handler can reach
///
/// Constructed once in `main` and shared through `web::Data`.
pub struct AppState {
    pub chain: Blockchain,
    pub rewards: RewardBook,
    pub wallets: WalletStore,
    pub locations: LocationDirectory,
}

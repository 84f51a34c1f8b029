use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::rewards::RewardEntry;
use super::storage::{LedgerStorage, StorageError};

/// Fixed prefix of every wallet address
pub const ADDRESS_PREFIX: &str = "MW";

/// Number of random characters after the prefix
pub const ADDRESS_RANDOM_LEN: usize = 15;

const ADDRESS_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("Username not found: {0}")]
    UnknownUsername(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Selects which balance a credit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Currency {
    QuranCoin,
    MuslimCoin,
}

/// Represents a user's wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Wallet {
    /// Unique key within the store
    pub username: String,

    /// Generated address, fixed at registration
    pub address: String,

    /// QuranCoin balance
    pub quran_coin_balance: u64,

    /// MuslimCoin balance
    pub muslim_coin_balance: u64,
}

impl Wallet {
    /// Creates a zero-balance wallet
    pub fn new(username: String, address: String) -> Self {
        Wallet {
            username,
            address,
            quran_coin_balance: 0,
            muslim_coin_balance: 0,
        }
    }

    /// Increases the selected balance
    pub fn deposit(&mut self, amount: u64, currency: Currency) {
        let balance = match currency {
            Currency::QuranCoin => &mut self.quran_coin_balance,
            Currency::MuslimCoin => &mut self.muslim_coin_balance,
        };
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::QuranCoin => self.quran_coin_balance,
            Currency::MuslimCoin => self.muslim_coin_balance,
        }
    }
}

/// Generates a wallet address: `MW` followed by 15 characters from `[A-Z0-9]`
pub fn generate_address() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ADDRESS_RANDOM_LEN)
        .map(|_| ADDRESS_CHARSET[rng.gen_range(0..ADDRESS_CHARSET.len())] as char)
        .collect();

    format!("{}{}", ADDRESS_PREFIX, suffix)
}

/// Durable home of wallet records
pub trait WalletRecords: Send + Sync + fmt::Debug {
    /// Writes every given wallet, all or nothing
    fn save_wallets(&self, wallets: &[Wallet]) -> Result<(), StorageError>;
}

impl WalletRecords for LedgerStorage {
    fn save_wallets(&self, wallets: &[Wallet]) -> Result<(), StorageError> {
        LedgerStorage::save_wallets(self, wallets)
    }
}

/// Manages every wallet, keyed by username
///
/// Reads go straight to the `DashMap`. Writes are serialized by `writes`
/// and reach the records before the map, so a failed write changes nothing.
#[derive(Debug, Default)]
pub struct WalletStore {
    wallets: DashMap<String, Wallet>,

    /// Storage for wallet records
    records: Option<Arc<dyn WalletRecords>>,

    /// Held by the single in-flight write
    writes: Mutex<()>,
}

impl WalletStore {
    /// Creates an empty in-memory wallet store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a wallet store backed by persistent storage, loading any saved wallets
    pub fn with_storage(storage: Arc<LedgerStorage>) -> Result<Self, WalletError> {
        let wallets = storage.load_wallets()?;
        info!("Loaded {} wallets from storage", wallets.len());

        let records: Arc<dyn WalletRecords> = storage;
        Ok(Self::from_parts(wallets, Some(records)))
    }

    fn from_parts(wallets: Vec<Wallet>, records: Option<Arc<dyn WalletRecords>>) -> Self {
        WalletStore {
            wallets: wallets
                .into_iter()
                .map(|wallet| (wallet.username.clone(), wallet))
                .collect(),
            records,
            writes: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new user with a fresh zero-balance wallet
    ///
    /// # Returns
    ///
    /// The new wallet, or `DuplicateUsername` without touching any state
    pub fn register(&self, username: &str) -> Result<Wallet, WalletError> {
        let _writes = self.lock_writes();

        if self.wallets.contains_key(username) {
            return Err(WalletError::DuplicateUsername(username.to_string()));
        }

        let mut address = generate_address();
        while self.find_by_address(&address).is_some() {
            address = generate_address();
        }

        let wallet = Wallet::new(username.to_string(), address);
        self.commit(vec![wallet.clone()])?;

        info!("Wallet created for {}: {}", wallet.username, wallet.address);
        Ok(wallet)
    }

    /// Adds `amount` to the selected balance of `username`
    ///
    /// # Returns
    ///
    /// The updated wallet
    pub fn credit(&self, username: &str, amount: u64, currency: Currency) -> Result<Wallet, WalletError> {
        let _writes = self.lock_writes();

        let mut wallet = self
            .get(username)
            .ok_or_else(|| WalletError::UnknownUsername(username.to_string()))?;
        wallet.deposit(amount, currency);
        self.commit(vec![wallet.clone()])?;

        Ok(wallet)
    }

    /// Credits every numeric reward whose miner is a registered user
    ///
    /// All credits are written in one batch: either every registered miner
    /// is paid or none is. Certificates carry no balance and unknown miners
    /// are skipped.
    ///
    /// # Returns
    ///
    /// The credited wallets, in order of first reward
    pub fn apply_rewards(&self, rewards: &[RewardEntry]) -> Result<Vec<Wallet>, WalletError> {
        let _writes = self.lock_writes();
        let mut credited: Vec<Wallet> = Vec::new();

        for reward in rewards {
            let (Some(amount), Some(currency)) = (reward.amount(), reward.currency()) else {
                continue;
            };

            if let Some(wallet) = credited.iter_mut().find(|w| w.username == reward.miner()) {
                wallet.deposit(amount, currency);
                continue;
            }

            match self.get(reward.miner()) {
                Some(mut wallet) => {
                    wallet.deposit(amount, currency);
                    credited.push(wallet);
                }
                None => {
                    warn!("Skipping {} reward for unregistered miner {}", reward.reward_type(), reward.miner());
                }
            }
        }

        self.commit(credited.clone())?;
        for wallet in &credited {
            info!(
                "Rewarded {}: {} QuranCoin, {} MuslimCoin",
                wallet.username, wallet.quran_coin_balance, wallet.muslim_coin_balance
            );
        }

        Ok(credited)
    }

    /// Gets a wallet by username
    pub fn get(&self, username: &str) -> Option<Wallet> {
        self.wallets.get(username).map(|entry| entry.value().clone())
    }

    /// Gets a wallet by its address
    pub fn find_by_address(&self, address: &str) -> Option<Wallet> {
        self.wallets
            .iter()
            .find(|entry| entry.value().address == address)
            .map(|entry| entry.value().clone())
    }

    /// Gets all wallets
    pub fn all(&self) -> Vec<Wallet> {
        self.wallets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// Writes every wallet to storage as one snapshot
    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(records) = &self.records {
            records.save_wallets(&self.all())?;
        }
        Ok(())
    }

    // Caller must hold `writes`
    fn commit(&self, wallets: Vec<Wallet>) -> Result<(), WalletError> {
        if wallets.is_empty() {
            return Ok(());
        }
        if let Some(records) = &self.records {
            records.save_wallets(&wallets)?;
        }

        for wallet in wallets {
            self.wallets.insert(wallet.username.clone(), wallet);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// Records that start refusing writes once `failing` is raised
    #[derive(Debug, Default)]
    struct FlakyRecords {
        failing: AtomicBool,
    }

    impl WalletRecords for FlakyRecords {
        fn save_wallets(&self, _wallets: &[Wallet]) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::NotFound("wallet tree unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn is_valid_address(address: &str) -> bool {
        address.len() == ADDRESS_PREFIX.len() + ADDRESS_RANDOM_LEN
            && address.starts_with(ADDRESS_PREFIX)
            && address[ADDRESS_PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    #[test]
    fn test_address_format() {
        for _ in 0..200 {
            let address = generate_address();
            assert!(is_valid_address(&address), "bad address {address}");
        }
    }

    #[test]
    fn test_register() {
        let store = WalletStore::new();
        let wallet = store.register("alice").unwrap();

        assert_eq!(wallet.username, "alice");
        assert!(is_valid_address(&wallet.address));
        assert_eq!(wallet.quran_coin_balance, 0);
        assert_eq!(wallet.muslim_coin_balance, 0);
        assert_eq!(store.get("alice"), Some(wallet));
    }

    #[test]
    fn test_duplicate_registration() {
        let store = WalletStore::new();
        let original = store.register("alice").unwrap();

        let result = store.register("alice");

        assert!(matches!(result, Err(WalletError::DuplicateUsername(name)) if name == "alice"));
        let stored = store.get("alice").unwrap();
        assert_eq!(stored, original);
        assert_eq!((stored.quran_coin_balance, stored.muslim_coin_balance), (0, 0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_credit_accumulates() {
        let store = WalletStore::new();
        store.register("alice").unwrap();

        store.credit("alice", 10, Currency::QuranCoin).unwrap();
        let wallet = store.credit("alice", 5, Currency::QuranCoin).unwrap();

        assert_eq!(wallet.quran_coin_balance, 15);
        assert_eq!(wallet.muslim_coin_balance, 0);
        assert_eq!(store.get("alice").unwrap().balance(Currency::QuranCoin), 15);

        store.credit("alice", 25, Currency::MuslimCoin).unwrap();
        assert_eq!(store.get("alice").unwrap().muslim_coin_balance, 25);
    }

    #[test]
    fn test_credit_unknown_user() {
        let store = WalletStore::new();
        let result = store.credit("nobody", 10, Currency::QuranCoin);
        assert!(matches!(result, Err(WalletError::UnknownUsername(_))));
    }

    #[test]
    fn test_find_by_address() {
        let store = WalletStore::new();
        let alice = store.register("alice").unwrap();
        store.register("bob").unwrap();

        assert_eq!(store.find_by_address(&alice.address), Some(alice));
        assert_eq!(store.find_by_address("MW000000000000000"), None);
    }

    #[test]
    fn test_apply_rewards() {
        let store = WalletStore::new();
        store.register("m1").unwrap();
        store.register("m2").unwrap();

        let rewards = vec![
            RewardEntry::text("m1", 1, 7),
            RewardEntry::check_in("m2", "X", 5),
            RewardEntry::achievement("m1", 100),
            RewardEntry::text("stranger", 2, 3),
        ];

        let credited = store.apply_rewards(&rewards).unwrap();

        assert_eq!(credited.len(), 2);
        assert_eq!(store.get("m1").unwrap().quran_coin_balance, 70);
        assert_eq!(store.get("m2").unwrap().muslim_coin_balance, 25);
        assert!(store.get("stranger").is_none());
    }

    #[test]
    fn test_concurrent_credits_are_not_lost() {
        let store = Arc::new(WalletStore::new());
        store.register("alice").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.credit("alice", 1, Currency::QuranCoin).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("alice").unwrap().quran_coin_balance, 800);
    }

    #[test]
    fn test_storage_round_trip() {
        let storage = Arc::new(LedgerStorage::temporary().unwrap());

        let store = WalletStore::with_storage(Arc::clone(&storage)).unwrap();
        let alice = store.register("alice").unwrap();
        store.credit("alice", 30, Currency::QuranCoin).unwrap();

        let reloaded = WalletStore::with_storage(storage).unwrap();
        let wallet = reloaded.get("alice").unwrap();
        assert_eq!(wallet.address, alice.address);
        assert_eq!(wallet.quran_coin_balance, 30);
    }

    #[test]
    fn test_save_snapshot() {
        let storage = Arc::new(LedgerStorage::temporary().unwrap());
        let store = WalletStore::with_storage(Arc::clone(&storage)).unwrap();
        store.register("alice").unwrap();
        store.register("bob").unwrap();

        store.save().unwrap();

        assert_eq!(storage.load_wallets().unwrap().len(), 2);
    }

    #[test]
    fn test_apply_rewards_is_all_or_nothing() {
        let records = Arc::new(FlakyRecords::default());
        let store = WalletStore::from_parts(Vec::new(), Some(records.clone()));
        store.register("m1").unwrap();
        store.register("m2").unwrap();

        records.failing.store(true, Ordering::SeqCst);
        let rewards = vec![RewardEntry::text("m1", 1, 7), RewardEntry::check_in("m2", "X", 5)];
        let result = store.apply_rewards(&rewards);

        assert!(matches!(result, Err(WalletError::StorageError(_))));
        assert_eq!(store.get("m1").unwrap().quran_coin_balance, 0);
        assert_eq!(store.get("m2").unwrap().muslim_coin_balance, 0);

        records.failing.store(false, Ordering::SeqCst);
        let credited = store.apply_rewards(&rewards).unwrap();
        assert_eq!(credited.len(), 2);
        assert_eq!(store.get("m1").unwrap().quran_coin_balance, 70);
        assert_eq!(store.get("m2").unwrap().muslim_coin_balance, 25);
    }

    #[test]
    fn test_apply_rewards_sums_per_miner() {
        let store = WalletStore::new();
        store.register("m1").unwrap();

        let rewards = vec![RewardEntry::text("m1", 1, 7), RewardEntry::text("m1", 2, 3)];
        let credited = store.apply_rewards(&rewards).unwrap();

        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].quran_coin_balance, 100);
        assert_eq!(store.get("m1").unwrap().quran_coin_balance, 100);
    }

    #[test]
    fn test_failed_registration_leaves_no_wallet() {
        let records = Arc::new(FlakyRecords::default());
        records.failing.store(true, Ordering::SeqCst);
        let store = WalletStore::from_parts(Vec::new(), Some(records));

        assert!(store.register("alice").is_err());
        assert!(store.get("alice").is_none());
    }
}

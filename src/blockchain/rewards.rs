use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::Block;
use super::chain::{Blockchain, ChainError};
use super::payload::Payload;
use super::wallet::Currency;

/// QuranCoin paid per memorized ayah
pub const QURAN_COIN_PER_AYAH: u64 = 10;

/// MuslimCoin paid per prayer at a registered location
pub const MUSLIM_COIN_PER_PRAYER: u64 = 5;

/// Completion percentage that earns the memorization certificate
pub const FULL_COMPLETION: u8 = 100;

const CERTIFICATE_TEXT: &str = "Certificate of Completion for Memorizing 100% of the Quran";
const CERTIFICATE_VALUE: &str = "Priceless";

/// Errors that can occur while issuing rewards
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Invalid completion percentage: {0} (must be 0-100)")]
    InvalidCompletion(u8),

    #[error("No registered location within {radius} meters (nearest is {distance:.1} meters away)")]
    NotNearLocation { distance: f64, radius: f64 },

    #[error("No registered locations to check in at")]
    NoLocations,
}

/// A pending reward awaiting batch sealing
///
/// Serialized with a `reward_type` tag of `QuranCoin`, `MuslimCoin` or `NFT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reward_type")]
pub enum RewardEntry {
    /// Reward for memorizing ayahs of a surah
    #[serde(rename = "QuranCoin")]
    Text {
        miner: String,
        surah: u32,
        ayah_count: u64,
        reward_amount: u64,
    },

    /// Reward for praying at a registered location
    #[serde(rename = "MuslimCoin")]
    CheckIn {
        miner: String,
        location: String,
        prayer_count: u64,
        reward_amount: u64,
    },

    /// Certificate for completing memorization
    #[serde(rename = "NFT")]
    Achievement {
        miner: String,
        completion_percent: u8,
        nft_data: String,
        reward_value: String,
    },
}

impl RewardEntry {
    pub fn text(miner: impl Into<String>, surah: u32, ayah_count: u64) -> Self {
        RewardEntry::Text {
            miner: miner.into(),
            surah,
            ayah_count,
            reward_amount: ayah_count.saturating_mul(QURAN_COIN_PER_AYAH),
        }
    }

    pub fn check_in(miner: impl Into<String>, location: impl Into<String>, prayer_count: u64) -> Self {
        RewardEntry::CheckIn {
            miner: miner.into(),
            location: location.into(),
            prayer_count,
            reward_amount: prayer_count.saturating_mul(MUSLIM_COIN_PER_PRAYER),
        }
    }

    pub fn achievement(miner: impl Into<String>, completion_percent: u8) -> Self {
        RewardEntry::Achievement {
            miner: miner.into(),
            completion_percent,
            nft_data: CERTIFICATE_TEXT.to_string(),
            reward_value: CERTIFICATE_VALUE.to_string(),
        }
    }

    pub fn miner(&self) -> &str {
        match self {
            RewardEntry::Text { miner, .. }
            | RewardEntry::CheckIn { miner, .. }
            | RewardEntry::Achievement { miner, .. } => miner,
        }
    }

    /// Numeric amount paid, `None` for certificates
    pub fn amount(&self) -> Option<u64> {
        match self {
            RewardEntry::Text { reward_amount, .. } | RewardEntry::CheckIn { reward_amount, .. } => {
                Some(*reward_amount)
            }
            RewardEntry::Achievement { .. } => None,
        }
    }

    /// Balance the amount is credited to, `None` for certificates
    pub fn currency(&self) -> Option<Currency> {
        match self {
            RewardEntry::Text { .. } => Some(Currency::QuranCoin),
            RewardEntry::CheckIn { .. } => Some(Currency::MuslimCoin),
            RewardEntry::Achievement { .. } => None,
        }
    }

    /// Display tag: `QuranCoin`, `MuslimCoin` or `NFT`
    pub fn reward_type(&self) -> &'static str {
        match self {
            RewardEntry::Text { .. } => "QuranCoin",
            RewardEntry::CheckIn { .. } => "MuslimCoin",
            RewardEntry::Achievement { .. } => "NFT",
        }
    }

    /// Whether the entry is sealed when the book is flushed
    pub fn is_issuable(&self) -> bool {
        match self {
            RewardEntry::Achievement { completion_percent, .. } => *completion_percent == FULL_COMPLETION,
            _ => true,
        }
    }
}

/// Accumulates pending rewards and seals them into one block on flush
///
/// `pending` is only locked for short list operations, never while a
/// block is mined. Flushes are serialized by `flush_lock`.
#[derive(Debug, Default)]
pub struct RewardBook {
    pending: Mutex<Vec<RewardEntry>>,

    /// Held by the single in-flight flush
    flush_lock: Mutex<()>,
}

impl RewardBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reward to the pending set
    ///
    /// # Returns
    ///
    /// The number of pending entries after the add
    pub fn add(&self, entry: RewardEntry) -> Result<usize, RewardError> {
        if let RewardEntry::Achievement { completion_percent, .. } = &entry {
            if *completion_percent > FULL_COMPLETION {
                return Err(RewardError::InvalidCompletion(*completion_percent));
            }
        }

        info!(
            "Adding {} reward for miner: {}",
            entry.reward_type(),
            entry.miner()
        );

        let mut pending = self.lock_pending();
        pending.push(entry);
        Ok(pending.len())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<RewardEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seals every issuable pending reward into one `Reward` block
    ///
    /// The entries present when the flush starts are sealed and then removed;
    /// rewards added while the block is mined stay pending for the next
    /// flush. A failed append removes nothing.
    ///
    /// # Returns
    ///
    /// The sealed block, or `None` if there was nothing to issue
    pub fn flush(&self, chain: &Blockchain) -> Result<Option<Block>, ChainError> {
        self.flush_with(|payload| chain.append(payload).map(Some))
    }

    /// Like [`RewardBook::flush`], giving up if `cancel` is raised while mining
    ///
    /// A cancelled flush leaves every entry pending.
    pub fn flush_until(&self, chain: &Blockchain, cancel: &AtomicBool) -> Result<Option<Block>, ChainError> {
        self.flush_with(|payload| chain.append_until(payload, cancel))
    }

    fn flush_with<F>(&self, append: F) -> Result<Option<Block>, ChainError>
    where
        F: FnOnce(Payload) -> Result<Option<Block>, ChainError>,
    {
        let _flush = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Adds only push, so the first `taken` entries stay put until removed below
        let snapshot = self.pending();
        let taken = snapshot.len();
        if taken == 0 {
            return Ok(None);
        }

        let rewards: Vec<RewardEntry> = snapshot.into_iter().filter(RewardEntry::is_issuable).collect();
        let skipped = taken - rewards.len();
        if skipped > 0 {
            warn!("Dropping {} achievement rewards below {}% completion", skipped, FULL_COMPLETION);
        }

        if rewards.is_empty() {
            self.lock_pending().drain(..taken);
            return Ok(None);
        }

        info!("Processing {} rewards...", rewards.len());
        let block = append(Payload::Reward { rewards })?;
        if block.is_some() {
            self.lock_pending().drain(..taken);
        }

        Ok(block)
    }

    /// Gets a copy of the pending rewards
    pub fn pending(&self) -> Vec<RewardEntry> {
        self.lock_pending().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_reward_amounts() {
        let text = RewardEntry::text("miner_1", 1, 7);
        let check_in = RewardEntry::check_in("miner_2", "Masjid Al-Haram", 5);
        let nft = RewardEntry::achievement("miner_3", 100);

        assert_eq!(text.amount(), Some(70));
        assert_eq!(text.currency(), Some(Currency::QuranCoin));
        assert_eq!(check_in.amount(), Some(25));
        assert_eq!(check_in.currency(), Some(Currency::MuslimCoin));
        assert_eq!(nft.amount(), None);
        assert_eq!(nft.currency(), None);
        assert_eq!(nft.miner(), "miner_3");
    }

    #[test]
    fn test_reward_entry_layout() {
        let value = serde_json::to_value(RewardEntry::text("miner_1", 2, 286)).unwrap();
        assert_eq!(value["reward_type"], "QuranCoin");
        assert_eq!(value["surah"], 2);
        assert_eq!(value["ayah_count"], 286);
        assert_eq!(value["reward_amount"], 2860);

        let value = serde_json::to_value(RewardEntry::achievement("miner_3", 100)).unwrap();
        assert_eq!(value["reward_type"], "NFT");
        assert_eq!(value["reward_value"], "Priceless");
    }

    #[test]
    fn test_add_rejects_completion_over_100() {
        let book = RewardBook::new();

        let result = book.add(RewardEntry::achievement("miner", 101));
        assert!(matches!(result, Err(RewardError::InvalidCompletion(101))));
        assert!(book.is_empty());

        assert_eq!(book.add(RewardEntry::achievement("miner", 40)).unwrap(), 1);
    }

    #[test]
    fn test_flush_empty_book_mines_nothing() {
        let chain = Blockchain::new(1).unwrap();
        let book = RewardBook::new();

        assert!(book.flush(&chain).unwrap().is_none());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_flush_seals_one_reward_block() {
        let chain = Blockchain::new(1).unwrap();
        let book = RewardBook::new();
        let text = RewardEntry::text("m1", 1, 7);
        let check_in = RewardEntry::check_in("m2", "X", 5);

        book.add(text.clone()).unwrap();
        book.add(check_in.clone()).unwrap();

        let block = book.flush(&chain).unwrap().unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(block.data().kind(), "Reward");
        match block.data() {
            Payload::Reward { rewards } => {
                assert_eq!(rewards, &vec![text, check_in]);
                assert_eq!(rewards[0].amount(), Some(70));
                assert_eq!(rewards[1].amount(), Some(25));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(book.is_empty());
        assert!(chain.validate());

        // A second flush has nothing left to seal
        assert!(book.flush(&chain).unwrap().is_none());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_flush_skips_incomplete_achievements() {
        let chain = Blockchain::new(1).unwrap();
        let book = RewardBook::new();

        book.add(RewardEntry::achievement("partial", 99)).unwrap();
        book.add(RewardEntry::achievement("complete", 100)).unwrap();

        let block = book.flush(&chain).unwrap().unwrap();
        match block.data() {
            Payload::Reward { rewards } => {
                assert_eq!(rewards.len(), 1);
                assert_eq!(rewards[0].miner(), "complete");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_flush_with_only_incomplete_achievements() {
        let chain = Blockchain::new(1).unwrap();
        let book = RewardBook::new();

        book.add(RewardEntry::achievement("partial", 50)).unwrap();

        assert!(book.flush(&chain).unwrap().is_none());
        assert_eq!(chain.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn test_book_stays_usable_while_flush_mines() {
        // Difficulty 64 never finishes on its own
        let chain = Arc::new(Blockchain::new(64).unwrap());
        let book = Arc::new(RewardBook::new());
        let cancel = Arc::new(AtomicBool::new(false));
        book.add(RewardEntry::text("m1", 1, 7)).unwrap();

        let flush = {
            let (chain, book, cancel) = (Arc::clone(&chain), Arc::clone(&book), Arc::clone(&cancel));
            thread::spawn(move || book.flush_until(&chain, &cancel))
        };
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(book.add(RewardEntry::check_in("m2", "X", 5)).unwrap(), 2);
        assert_eq!(book.pending().len(), 2);
        assert!(started.elapsed() < Duration::from_secs(1));

        cancel.store(true, Ordering::Relaxed);
        assert!(flush.join().unwrap().unwrap().is_none());
        assert_eq!(book.len(), 2);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_flush_keeps_rewards_added_after_it_started() {
        let chain = Blockchain::new(1).unwrap();
        let book = RewardBook::new();
        let late = RewardEntry::check_in("m2", "X", 5);
        book.add(RewardEntry::text("m1", 1, 7)).unwrap();

        let block = book
            .flush_with(|payload| {
                book.add(late.clone()).unwrap();
                chain.append(payload).map(Some)
            })
            .unwrap()
            .unwrap();

        match block.data() {
            Payload::Reward { rewards } => assert_eq!(rewards.len(), 1),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(book.pending(), vec![late]);
    }
}

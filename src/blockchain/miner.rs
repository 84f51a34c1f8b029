use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use super::block::Block;

/// Number of attempts between progress reports
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Proof of work search over block nonces
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    /// Number of leading zero hex characters required in a block hash
    difficulty: usize,
}

impl Miner {
    pub fn new(difficulty: usize) -> Self {
        Miner { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Seals a draft block
    ///
    /// Tries nonces from 0 upward and returns the first block whose hash
    /// meets the difficulty, so the result is reproducible for fixed fields.
    /// Blocks the calling thread until a nonce is found.
    pub fn seal(&self, draft: Block) -> Result<Block, serde_json::Error> {
        self.seal_with_progress(draft, |_| {})
    }

    /// Seals a draft block, reporting the attempt count every
    /// [`PROGRESS_INTERVAL`] attempts
    pub fn seal_with_progress<F>(&self, draft: Block, on_progress: F) -> Result<Block, serde_json::Error>
    where
        F: FnMut(u64),
    {
        let never = AtomicBool::new(false);
        let sealed = self.search(draft, &never, on_progress)?;
        Ok(sealed.expect("search only stops early when cancelled"))
    }

    /// Seals a draft block unless `cancel` is raised first
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the search was cancelled before a nonce was found
    pub fn seal_until(&self, draft: Block, cancel: &AtomicBool) -> Result<Option<Block>, serde_json::Error> {
        self.search(draft, cancel, |_| {})
    }

    fn search<F>(&self, mut block: Block, cancel: &AtomicBool, mut on_progress: F) -> Result<Option<Block>, serde_json::Error>
    where
        F: FnMut(u64),
    {
        info!("Mining block {} for: {}", block.index, block.data.kind());

        let mut attempts: u64 = 0;
        block.nonce = 0;

        loop {
            let hash = block.compute_hash()?;

            if super::hash::meets_difficulty(&hash, self.difficulty) {
                block.hash = hash;
                info!("Block {} mined after {} attempts: {}", block.index, attempts + 1, block.hash);
                return Ok(Some(block));
            }

            attempts += 1;
            if attempts % PROGRESS_INTERVAL == 0 {
                debug!("Mining block {}: {} attempts", block.index, attempts);
                on_progress(attempts);

                if cancel.load(Ordering::Relaxed) {
                    info!("Mining block {} cancelled after {} attempts", block.index, attempts);
                    return Ok(None);
                }
            }

            block.nonce += 1;
        }
    }
}

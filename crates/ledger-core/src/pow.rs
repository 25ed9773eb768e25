//! Proof-of-work helpers: difficulty checks, cancellation, and the parallel miner.

use crate::{constants::HASH_HEX_SIZE, Block, LedgerError, Result};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zero_hex(hash: &str) -> usize {
    hash.bytes().take_while(|b| *b == b'0').count()
}

/// True when the first `difficulty` characters of `hash` are all `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_hex(hash) >= difficulty as usize
}

/// Rejects difficulties no digest can satisfy, which would otherwise mine forever.
pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty as usize > HASH_HEX_SIZE {
        return Err(LedgerError::UnreachableDifficulty(difficulty));
    }
    Ok(())
}

/// Cooperative cancellation flag shared between a caller and a mining job.
///
/// A token created with [`CancelToken::child`] reports cancelled when either
/// it or any of its ancestors has been cancelled; cancelling a child never
/// affects the parent.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Returns a guard that cancels this token when dropped.
    pub fn drop_guard(self) -> CancelOnDrop {
        CancelOnDrop(self)
    }
}

/// Cancels the wrapped token on drop. Used to stop a blocking mining job
/// when the future that spawned it is dropped.
#[derive(Debug)]
pub struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Mines `block` by searching nonces in parallel until its hash has at least
/// `difficulty` leading zero hex characters.
///
/// The winning nonce is whichever worker finds one first, so it need not be
/// the smallest; the returned block always satisfies `hash == derive_hash()`.
pub fn mine_parallel(block: &Block, difficulty: u32, cancel: &CancelToken) -> Result<Block> {
    check_difficulty(difficulty)?;
    if cancel.is_cancelled() {
        return Err(LedgerError::MiningCancelled);
    }
    let prefix = block.hash_prefix();

    // Rayon splits the nonce range across the pool; a cancelled token makes
    // every worker report a "hit" so the search unwinds quickly.
    let found = (0u64..u64::MAX).into_par_iter().find_any(|nonce| {
        cancel.is_cancelled() || meets_difficulty(&Block::hash_with(&prefix, *nonce), difficulty)
    });

    let nonce = found.ok_or(LedgerError::MiningCancelled)?;
    let hash = Block::hash_with(&prefix, nonce);
    if !meets_difficulty(&hash, difficulty) {
        return Err(LedgerError::MiningCancelled);
    }

    let mut mined = block.clone();
    mined.nonce = nonce;
    mined.hash = hash;
    info!(nonce, hash = %mined.hash, difficulty, "block mined (parallel)");
    Ok(mined)
}

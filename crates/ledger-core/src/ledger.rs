//! The ledger service: the only place blocks are appended, removed, or amended.
//!
//! Every mutation holds the writer lock for its whole read-mine-write sequence.
//! Mining runs on tokio's blocking pool and nothing is written until it has
//! finished, so a cancelled or dropped mutation leaves the store untouched.
//! Removal and amendment stage the entire re-mined suffix in memory, check it,
//! and hand it to the store as one [`Repair`].

use crate::{
    chain::{self, ChainReport},
    pow::{self, check_difficulty, meets_difficulty, CancelToken},
    store::{LedgerStore, Repair, Rewrite},
    Block, LedgerConfig, LedgerError, Payload, Result,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Outcome of a successful removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removal {
    pub removed: Block,
    /// Former successors of the removed block, re-linked and re-mined, in chain order.
    pub rewritten: Vec<Block>,
}

pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    config: LedgerConfig,
    writer: Mutex<()>,
    // Readers hold this shared; commits hold it exclusively so a reader never
    // sees half of a multi-record write.
    view: RwLock<()>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            writer: Mutex::new(()),
            view: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Ensure a genesis block exists. Idempotent; returns the block when one was created.
    pub async fn initialize(&self) -> Result<Option<Block>> {
        let _writer = self.writer.lock().await;
        if !self.read(|s| s.is_empty())? {
            return Ok(None);
        }
        let genesis = Block::genesis(&self.config.genesis_message);
        let genesis = self
            .mine(genesis, self.config.genesis_difficulty, &CancelToken::new())
            .await?;
        self.commit(|s| s.insert(&genesis))?;
        info!(hash = %genesis.hash, "genesis block created");
        Ok(Some(genesis))
    }

    pub async fn append(&self, data: Payload) -> Result<Block> {
        self.append_cancellable(data, &CancelToken::new()).await
    }

    /// Mines `data` onto the current tail and persists it. The block only
    /// becomes visible once mining has succeeded.
    pub async fn append_cancellable(&self, data: Payload, cancel: &CancelToken) -> Result<Block> {
        let _writer = self.writer.lock().await;
        let tail = self
            .read(|s| s.tail())?
            .ok_or(LedgerError::LedgerUninitialized)?;
        let block = Block::now(data, tail.hash);
        let block = self.mine(block, self.config.difficulty, cancel).await?;
        self.commit(|s| s.insert(&block))?;
        info!(hash = %block.hash, previous = %block.previous_hash, "block appended");
        Ok(block)
    }

    /// Removes the block with `hash` and repairs the chain behind it.
    /// Unknown hashes and the genesis block are reported as `false`.
    pub async fn delete(&self, hash: &str) -> Result<bool> {
        match self.remove(hash, &CancelToken::new()).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_rejection() => {
                debug!(%hash, %err, "delete rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Removes a non-genesis block, re-linking and re-mining every block
    /// after it. The repaired suffix is committed in one step.
    pub async fn remove(&self, hash: &str, cancel: &CancelToken) -> Result<Removal> {
        let _writer = self.writer.lock().await;
        let chain = self.read(|s| s.list_ordered())?;
        let index = locate(&chain, hash)?;

        let anchor = chain[index - 1].clone();
        let removed = chain[index].clone();
        let pending = chain[index + 1..]
            .iter()
            .map(|b| Rewrite {
                old_hash: b.hash.clone(),
                block: b.clone(),
            })
            .collect();

        let rewrites = self.restage(anchor, index - 1, pending, cancel).await?;
        let repair = Repair {
            removed: Some(removed.hash.clone()),
            rewrites,
        };
        self.commit(|s| s.commit_repair(&repair))?;
        info!(
            removed = %removed.hash,
            index,
            rewritten = repair.rewrites.len(),
            "block removed and chain repaired"
        );
        Ok(Removal {
            removed,
            rewritten: repair.rewrites.into_iter().map(|r| r.block).collect(),
        })
    }

    /// Replaces the payload of a non-genesis block. The block keeps its
    /// timestamp and position, is re-mined, and every later block is repaired.
    pub async fn amend(&self, hash: &str, data: Payload, cancel: &CancelToken) -> Result<Block> {
        let _writer = self.writer.lock().await;
        let chain = self.read(|s| s.list_ordered())?;
        let index = locate(&chain, hash)?;

        let anchor = chain[index - 1].clone();
        let target = &chain[index];
        let pending = std::iter::once(Rewrite {
            old_hash: target.hash.clone(),
            block: target.with_data(data),
        })
        .chain(chain[index + 1..].iter().map(|b| Rewrite {
            old_hash: b.hash.clone(),
            block: b.clone(),
        }))
        .collect();

        let rewrites = self.restage(anchor, index - 1, pending, cancel).await?;
        let amended = rewrites[0].block.clone();
        let repair = Repair {
            removed: None,
            rewrites,
        };
        self.commit(|s| s.commit_repair(&repair))?;
        info!(
            old = %hash,
            new = %amended.hash,
            rewritten = repair.rewrites.len(),
            "block amended and chain repaired"
        );
        Ok(amended)
    }

    pub fn get_all(&self) -> Result<Vec<Block>> {
        self.read(|s| s.list_ordered())
    }

    pub fn get_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        self.read(|s| s.get_by_hash(hash))
    }

    pub fn tail(&self) -> Result<Option<Block>> {
        self.read(|s| s.tail())
    }

    pub fn len(&self) -> Result<usize> {
        self.read(|s| s.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(|s| s.is_empty())
    }

    /// Recomputes every hash and link. An invalid chain is `Ok(false)`;
    /// only store failures are errors.
    pub fn validate(&self) -> Result<bool> {
        Ok(self.verify()?.is_valid)
    }

    pub fn verify(&self) -> Result<ChainReport> {
        let chain = self.get_all()?;
        Ok(chain::inspect(&chain))
    }

    fn read<T>(&self, f: impl FnOnce(&S) -> anyhow::Result<T>) -> Result<T> {
        let _view = self.view.read();
        f(self.store.as_ref()).map_err(LedgerError::Persistence)
    }

    fn commit(&self, f: impl FnOnce(&S) -> anyhow::Result<()>) -> Result<()> {
        let _view = self.view.write();
        f(self.store.as_ref()).map_err(LedgerError::Persistence)
    }

    async fn mine(&self, block: Block, difficulty: u32, cancel: &CancelToken) -> Result<Block> {
        check_difficulty(difficulty)?;
        let job = cancel.child();
        // Dropping this future stops the blocking search.
        let _guard = job.clone().drop_guard();
        let parallel = self.config.parallel_mining;
        Ok(tokio::task::spawn_blocking(move || mine_one(block, difficulty, parallel, &job)).await??)
    }

    /// Re-links and re-mines `pending` behind `anchor` (at `anchor_index`),
    /// then checks the staged blocks before anything is written.
    async fn restage(
        &self,
        anchor: Block,
        anchor_index: usize,
        pending: Vec<Rewrite>,
        cancel: &CancelToken,
    ) -> Result<Vec<Rewrite>> {
        check_difficulty(self.config.difficulty)?;
        let job = cancel.child();
        let _guard = job.clone().drop_guard();
        let difficulty = self.config.difficulty;
        let parallel = self.config.parallel_mining;
        let anchor_hash = anchor.hash.clone();

        let staged = tokio::task::spawn_blocking(move || {
            let mut last_hash = anchor_hash;
            let mut staged = Vec::with_capacity(pending.len());
            for Rewrite { old_hash, block } in pending {
                let successor = mine_one(block.relinked(&last_hash), difficulty, parallel, &job)?;
                debug!(old = %old_hash, new = %successor.hash, "re-mined successor");
                last_hash = successor.hash.clone();
                staged.push(Rewrite {
                    old_hash,
                    block: successor,
                });
            }
            Ok::<_, LedgerError>(staged)
        })
        .await??;

        verify_staged(&anchor, anchor_index, &staged, difficulty)?;
        Ok(staged)
    }
}

/// Index of `hash` in a chain that is allowed to be mutated.
fn locate(chain: &[Block], hash: &str) -> Result<usize> {
    if chain.is_empty() {
        return Err(LedgerError::LedgerUninitialized);
    }
    match chain.iter().position(|b| b.hash == hash) {
        Some(0) => Err(LedgerError::GenesisProtected),
        Some(index) => Ok(index),
        None => Err(LedgerError::BlockNotFound(hash.to_string())),
    }
}

fn mine_one(mut block: Block, difficulty: u32, parallel: bool, cancel: &CancelToken) -> Result<Block> {
    if parallel {
        pow::mine_parallel(&block, difficulty, cancel)
    } else {
        block.mine_cancellable(difficulty, cancel)?;
        Ok(block)
    }
}

fn verify_staged(
    anchor: &Block,
    anchor_index: usize,
    staged: &[Rewrite],
    difficulty: u32,
) -> Result<()> {
    let mut segment = Vec::with_capacity(staged.len() + 1);
    segment.push(anchor.clone());
    segment.extend(staged.iter().map(|r| r.block.clone()));

    if let Some(fault) = chain::first_fault(&segment) {
        return Err(LedgerError::RepairRejected {
            index: anchor_index + fault.index(),
        });
    }
    if let Some(offset) = staged
        .iter()
        .position(|r| !meets_difficulty(&r.block.hash, difficulty))
    {
        return Err(LedgerError::RepairRejected {
            index: anchor_index + 1 + offset,
        });
    }
    Ok(())
}

//! The persistence port the ledger operates through, plus an in-memory backend.

use crate::Block;
use anyhow::Result;
use parking_lot::RwLock;
use thiserror::Error;

/// Typed failures a store reports inside its `anyhow::Error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("a block with hash {0} already exists")]
    DuplicateHash(String),
    #[error("no block with hash {0}")]
    MissingBlock(String),
}

/// One block replaced in place: the record currently stored under `old_hash`
/// becomes `block`, keeping its position in the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    pub old_hash: String,
    pub block: Block,
}

/// A fully staged chain repair: an optional removal followed by in-order rewrites.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Repair {
    pub removed: Option<String>,
    pub rewrites: Vec<Rewrite>,
}

/// Trait the storage backends implement for the ledger to operate.
/// Lives in `ledger-core` to avoid a circular dependency.
pub trait LedgerStore: Send + Sync {
    /// All blocks in append order.
    fn list_ordered(&self) -> Result<Vec<Block>>;
    fn get_by_hash(&self, hash: &str) -> Result<Option<Block>>;
    /// Rejects a hash that is already present with [`StoreError::DuplicateHash`].
    fn insert(&self, block: &Block) -> Result<()>;
    /// Replaces the block stored under `hash`, keeping its position.
    fn update(&self, hash: &str, block: &Block) -> Result<()>;
    /// Returns whether a block was removed.
    fn delete(&self, hash: &str) -> Result<bool>;

    /// Most recently appended block.
    fn tail(&self) -> Result<Option<Block>> {
        Ok(self.list_ordered()?.pop())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.list_ordered()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Applies a staged repair. The default runs the steps one by one and can
    /// stop part way through; backends with transactions should override it so
    /// the repair lands entirely or not at all.
    fn commit_repair(&self, repair: &Repair) -> Result<()> {
        if let Some(hash) = &repair.removed {
            if !self.delete(hash)? {
                return Err(StoreError::MissingBlock(hash.clone()).into());
            }
        }
        for rewrite in &repair.rewrites {
            self.update(&rewrite.old_hash, &rewrite.block)?;
        }
        Ok(())
    }
}

/// Volatile store backed by a vector; every operation is atomic under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a stored block without any checks. Meant for simulating
    /// tampering in tests and tools.
    pub fn tamper<F: FnOnce(&mut Block)>(&self, index: usize, f: F) -> bool {
        match self.blocks.write().get_mut(index) {
            Some(block) => {
                f(block);
                true
            }
            None => false,
        }
    }

    fn position(blocks: &[Block], hash: &str) -> Option<usize> {
        blocks.iter().position(|b| b.hash == hash)
    }

    fn apply_rewrite(blocks: &mut [Block], hash: &str, block: &Block) -> Result<()> {
        let index =
            Self::position(blocks, hash).ok_or_else(|| StoreError::MissingBlock(hash.to_string()))?;
        if block.hash != hash && Self::position(blocks, &block.hash).is_some() {
            return Err(StoreError::DuplicateHash(block.hash.clone()).into());
        }
        blocks[index] = block.clone();
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    fn list_ordered(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.read().clone())
    }

    fn get_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        Ok(self.blocks.read().iter().find(|b| b.hash == hash).cloned())
    }

    fn insert(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write();
        if Self::position(&blocks, &block.hash).is_some() {
            return Err(StoreError::DuplicateHash(block.hash.clone()).into());
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn update(&self, hash: &str, block: &Block) -> Result<()> {
        Self::apply_rewrite(&mut self.blocks.write(), hash, block)
    }

    fn delete(&self, hash: &str) -> Result<bool> {
        let mut blocks = self.blocks.write();
        match Self::position(&blocks, hash) {
            Some(index) => {
                blocks.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn tail(&self) -> Result<Option<Block>> {
        Ok(self.blocks.read().last().cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.blocks.read().len())
    }

    fn commit_repair(&self, repair: &Repair) -> Result<()> {
        let mut guard = self.blocks.write();
        // Work on a copy so a failing step leaves the stored chain untouched.
        let mut staged = guard.clone();
        if let Some(hash) = &repair.removed {
            let index = Self::position(&staged, hash)
                .ok_or_else(|| StoreError::MissingBlock(hash.clone()))?;
            staged.remove(index);
        }
        for rewrite in &repair.rewrites {
            Self::apply_rewrite(&mut staged, &rewrite.old_hash, &rewrite.block)?;
        }
        *guard = staged;
        Ok(())
    }
}

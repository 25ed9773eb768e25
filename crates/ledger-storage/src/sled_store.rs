use anyhow::{Context, Result};
use ledger_core::{Block, LedgerStore, Repair, StoreError};
use sled::{
  transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
  },
  Db, IVec, Transactional, Tree,
};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const TREE_BY_HASH: &str = "by_hash";
const TREE_META: &str = "meta";
const KEY_NEXT_SEQ: &[u8] = b"next_seq";

/// Blocks are keyed by a big-endian sequence number so tree order is append
/// order; `by_hash` maps each hash to its sequence key.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  by_hash: Tree,
  meta: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled store at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    let by_hash = db.open_tree(TREE_BY_HASH)?;
    let meta = db.open_tree(TREE_META)?;
    info!(blocks = blocks.len(), "sled store opened");
    Ok(Self {
      db,
      blocks,
      by_hash,
      meta,
    })
  }

  pub fn flush(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  pub fn close(&self) -> Result<()> {
    self.flush()
  }

  /// Drops every block. Used by tests and tooling.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.by_hash.clear()?;
    self.meta.clear()?;
    self.flush()
  }
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  serde_json::from_slice(bytes).context("decoding stored block")
}

fn encode_block(block: &Block) -> Result<Vec<u8>> {
  serde_json::to_vec(block).context("encoding block")
}

fn decode_seq(bytes: &IVec) -> u64 {
  let mut arr = [0u8; 8];
  arr.copy_from_slice(&bytes[..8]);
  u64::from_be_bytes(arr)
}

fn abort<T>(err: StoreError) -> ConflictableTransactionResult<T, StoreError> {
  Err(ConflictableTransactionError::Abort(err))
}

fn tx_error(err: TransactionError<StoreError>) -> anyhow::Error {
  match err {
    TransactionError::Abort(e) => e.into(),
    TransactionError::Storage(e) => e.into(),
  }
}

/// Moves the record stored under `old_hash` to `new_hash`, in place.
fn rewrite_in(
  blocks: &TransactionalTree,
  by_hash: &TransactionalTree,
  old_hash: &str,
  new_hash: &str,
  bytes: &[u8],
) -> ConflictableTransactionResult<(), StoreError> {
  let seq = match by_hash.get(old_hash.as_bytes())? {
    Some(seq) => seq,
    None => return abort(StoreError::MissingBlock(old_hash.to_string())),
  };
  if new_hash != old_hash {
    if by_hash.get(new_hash.as_bytes())?.is_some() {
      return abort(StoreError::DuplicateHash(new_hash.to_string()));
    }
    by_hash.remove(old_hash.as_bytes())?;
    by_hash.insert(new_hash.as_bytes(), &seq[..])?;
  }
  blocks.insert(&seq[..], bytes)?;
  Ok(())
}

impl LedgerStore for SledStore {
  fn list_ordered(&self) -> Result<Vec<Block>> {
    self
      .blocks
      .iter()
      .values()
      .map(|v| decode_block(&v?))
      .collect()
  }

  fn get_by_hash(&self, hash: &str) -> Result<Option<Block>> {
    let Some(seq) = self.by_hash.get(hash.as_bytes())? else {
      return Ok(None);
    };
    self.blocks.get(&seq)?.map(|v| decode_block(&v)).transpose()
  }

  fn insert(&self, block: &Block) -> Result<()> {
    let bytes = encode_block(block)?;
    let hash = block.hash.as_bytes();
    let seq = (&self.blocks, &self.by_hash, &self.meta)
      .transaction(|(blocks, by_hash, meta)| {
        if by_hash.get(hash)?.is_some() {
          return abort(StoreError::DuplicateHash(block.hash.clone()));
        }
        let seq = meta.get(KEY_NEXT_SEQ)?.map(|v| decode_seq(&v)).unwrap_or(0);
        let key = seq.to_be_bytes();
        blocks.insert(&key[..], bytes.as_slice())?;
        by_hash.insert(hash, &key[..])?;
        meta.insert(KEY_NEXT_SEQ, &(seq + 1).to_be_bytes()[..])?;
        Ok(seq)
      })
      .map_err(tx_error)?;
    self.db.flush()?;
    debug!(seq, hash = %block.hash, "block inserted");
    Ok(())
  }

  fn update(&self, hash: &str, block: &Block) -> Result<()> {
    let bytes = encode_block(block)?;
    (&self.blocks, &self.by_hash)
      .transaction(|(blocks, by_hash)| rewrite_in(blocks, by_hash, hash, &block.hash, &bytes))
      .map_err(tx_error)?;
    self.db.flush()?;
    Ok(())
  }

  fn delete(&self, hash: &str) -> Result<bool> {
    let removed = (&self.blocks, &self.by_hash)
      .transaction(|(blocks, by_hash)| -> ConflictableTransactionResult<bool, StoreError> {
        match by_hash.remove(hash.as_bytes())? {
          Some(seq) => {
            blocks.remove(&seq[..])?;
            Ok(true)
          }
          None => Ok(false),
        }
      })
      .map_err(tx_error)?;
    self.db.flush()?;
    Ok(removed)
  }

  fn tail(&self) -> Result<Option<Block>> {
    self.blocks.last()?.map(|(_, v)| decode_block(&v)).transpose()
  }

  fn len(&self) -> Result<usize> {
    Ok(self.blocks.len())
  }

  /// The whole repair runs in one sled transaction: it lands completely or
  /// leaves the trees as they were.
  fn commit_repair(&self, repair: &Repair) -> Result<()> {
    let staged = repair
      .rewrites
      .iter()
      .map(|r| Ok((r.old_hash.as_str(), r.block.hash.as_str(), encode_block(&r.block)?)))
      .collect::<Result<Vec<_>>>()?;

    (&self.blocks, &self.by_hash)
      .transaction(|(blocks, by_hash)| {
        if let Some(hash) = &repair.removed {
          match by_hash.remove(hash.as_bytes())? {
            Some(seq) => {
              blocks.remove(&seq[..])?;
            }
            None => return abort(StoreError::MissingBlock(hash.clone())),
          }
        }
        for (old_hash, new_hash, bytes) in &staged {
          rewrite_in(blocks, by_hash, old_hash, new_hash, bytes)?;
        }
        Ok(())
      })
      .map_err(tx_error)?;
    self.db.flush()?;
    info!(
      removed = repair.removed.as_deref().unwrap_or("-"),
      rewrites = repair.rewrites.len(),
      "repair committed"
    );
    Ok(())
  }
}

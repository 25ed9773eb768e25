//! Error types for ledger operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// No genesis block present when a mutation was attempted.
    #[error("ledger not initialized")]
    LedgerUninitialized,

    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// The genesis block is the chain's trust anchor and is never removed or edited.
    #[error("genesis block is protected")]
    GenesisProtected,

    /// A store operation failed. Propagated unchanged, never retried here.
    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("mining cancelled")]
    MiningCancelled,

    /// More leading zeros than a hex SHA-256 digest has characters.
    #[error("difficulty {0} can never be met (max {max})", max = crate::constants::HASH_HEX_SIZE)]
    UnreachableDifficulty(u32),

    /// A staged repair failed its own verification; nothing was committed.
    #[error("staged repair rejected at chain index {index}")]
    RepairRejected { index: usize },

    #[error("mining worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Persistence(err)
    }
}

impl LedgerError {
    /// True for the rejections `delete` reports as `false` rather than as an error.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::BlockNotFound(_) | LedgerError::GenesisProtected
        )
    }
}

use crate::constants::{DEFAULT_DIFFICULTY, GENESIS_MESSAGE};
use serde::{Deserialize, Serialize};

/// Mining parameters for a [`crate::Ledger`] instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex characters required of appended and re-mined blocks.
    pub difficulty: u32,
    /// Difficulty the genesis block is mined at.
    pub genesis_difficulty: u32,
    pub genesis_message: String,
    /// Search nonces on the rayon pool instead of a single thread.
    pub parallel_mining: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            genesis_difficulty: DEFAULT_DIFFICULTY,
            genesis_message: GENESIS_MESSAGE.to_string(),
            parallel_mining: false,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_genesis_difficulty(mut self, difficulty: u32) -> Self {
        self.genesis_difficulty = difficulty;
        self
    }

    pub fn with_parallel_mining(mut self, parallel: bool) -> Self {
        self.parallel_mining = parallel;
        self
    }
}

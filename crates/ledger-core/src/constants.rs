pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// `previousHash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_MESSAGE: &str = "Genesis Block";
pub const DEFAULT_DIFFICULTY: u32 = 2;
/// Nonces tried between cancellation checks in the sequential miner.
pub const CANCEL_POLL_INTERVAL: u64 = 4096;

use crate::{
    constants::{CANCEL_POLL_INTERVAL, GENESIS_PREVIOUS_HASH},
    pow::{check_difficulty, meets_difficulty, CancelToken},
    LedgerError, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

/// Opaque record payload. The core only ever looks at its canonical serialization.
pub type Payload = Value;

/// Renders a point in time the way it is committed into block hashes:
/// RFC 3339, UTC, millisecond precision, `Z` suffix.
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One ledger entry.
///
/// Field order here is also the persisted record order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub timestamp: String,
    pub data: Payload,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Builds an unmined block with nonce 0 and a hash consistent with its fields.
    pub fn new(timestamp: impl Into<String>, data: Payload, previous_hash: impl Into<String>) -> Self {
        let mut block = Self {
            timestamp: timestamp.into(),
            data,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.derive_hash();
        block
    }

    /// Builds an unmined block stamped with the current time.
    pub fn now(data: Payload, previous_hash: impl Into<String>) -> Self {
        Self::new(canonical_timestamp(Utc::now()), data, previous_hash)
    }

    /// Unmined genesis block carrying `{ "message": <message> }`.
    pub fn genesis(message: &str) -> Self {
        Self::now(
            serde_json::json!({ "message": message }),
            GENESIS_PREVIOUS_HASH,
        )
    }

    pub fn is_genesis_link(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Same timestamp and payload, linked to a new predecessor. Unmined.
    pub(crate) fn relinked(&self, previous_hash: &str) -> Self {
        Self::new(self.timestamp.clone(), self.data.clone(), previous_hash)
    }

    /// Same timestamp and link, carrying a replacement payload. Unmined.
    pub(crate) fn with_data(&self, data: Payload) -> Self {
        Self::new(self.timestamp.clone(), data, self.previous_hash.clone())
    }

    /// Canonical payload bytes: compact JSON, object keys in insertion order.
    ///
    /// Floats with an integral value keep their fraction (`4.0`, `100.0`),
    /// whereas JavaScript's `JSON.stringify` prints `4` and `100`. Payloads
    /// that must hash identically across both should carry such values as
    /// integers.
    pub fn canonical_data(&self) -> String {
        self.data.to_string()
    }

    /// Hasher primed with everything except the nonce.
    pub(crate) fn hash_prefix(&self) -> Sha256 {
        Sha256::new()
            .chain_update(self.previous_hash.as_bytes())
            .chain_update(self.timestamp.as_bytes())
            .chain_update(self.canonical_data().as_bytes())
    }

    pub(crate) fn hash_with(prefix: &Sha256, nonce: u64) -> String {
        hex::encode(prefix.clone().chain_update(nonce.to_string()).finalize())
    }

    /// `SHA256(previousHash ++ timestamp ++ canonicalJSON(data) ++ nonce)` as lowercase hex.
    /// Ignores the stored `hash` field entirely.
    pub fn derive_hash(&self) -> String {
        Self::hash_with(&self.hash_prefix(), self.nonce)
    }

    /// True when the stored hash matches a recomputation.
    pub fn has_consistent_hash(&self) -> bool {
        self.hash == self.derive_hash()
    }

    /// Increments the nonce until the hash has `difficulty` leading zeros.
    /// Unbounded; returns the number of hashes computed.
    pub fn mine(&mut self, difficulty: u32) -> u64 {
        let prefix = self.hash_prefix();
        self.hash = Self::hash_with(&prefix, self.nonce);
        let mut attempts = 1;
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = Self::hash_with(&prefix, self.nonce);
            attempts += 1;
        }
        info!(nonce = self.nonce, hash = %self.hash, difficulty, "block mined");
        attempts
    }

    /// Like [`Block::mine`] but polls `cancel` and gives up with
    /// [`LedgerError::MiningCancelled`]. The block stays self-consistent
    /// (hash matches nonce) either way.
    pub fn mine_cancellable(&mut self, difficulty: u32, cancel: &CancelToken) -> Result<u64> {
        check_difficulty(difficulty)?;
        if cancel.is_cancelled() {
            return Err(LedgerError::MiningCancelled);
        }
        let prefix = self.hash_prefix();
        self.hash = Self::hash_with(&prefix, self.nonce);
        let mut attempts: u64 = 1;
        while !meets_difficulty(&self.hash, difficulty) {
            if attempts % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(LedgerError::MiningCancelled);
            }
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = Self::hash_with(&prefix, self.nonce);
            attempts += 1;
        }
        info!(nonce = self.nonce, hash = %self.hash, difficulty, "block mined");
        Ok(attempts)
    }
}

//! Whole-chain integrity checks.
//!
//! Each block from index 1 onwards has its hash recomputed from its own fields
//! (the stored `hash` is never trusted) and its `previousHash` compared against
//! the predecessor's *stored* hash. A forged hash on block `i - 1` is caught in
//! its own iteration, not by the successor that still points at it.

use crate::Block;
use serde::Serialize;
use tracing::warn;

/// First inconsistency found while walking a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChainFault {
    /// Stored hash differs from the recomputed one.
    #[serde(rename_all = "camelCase")]
    HashMismatch {
        index: usize,
        stored: String,
        recomputed: String,
    },
    /// `previousHash` does not match the predecessor's stored hash.
    #[serde(rename_all = "camelCase")]
    LinkMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

impl ChainFault {
    pub fn index(&self) -> usize {
        match self {
            ChainFault::HashMismatch { index, .. } | ChainFault::LinkMismatch { index, .. } => {
                *index
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub is_valid: bool,
    pub block_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<ChainFault>,
}

/// Locates the first fault, if any. Chains of 0 or 1 blocks are vacuously sound.
pub fn first_fault(chain: &[Block]) -> Option<ChainFault> {
    chain.windows(2).enumerate().find_map(|(i, pair)| {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = i + 1;
        let recomputed = current.derive_hash();
        if current.hash != recomputed {
            return Some(ChainFault::HashMismatch {
                index,
                stored: current.hash.clone(),
                recomputed,
            });
        }
        if current.previous_hash != previous.hash {
            return Some(ChainFault::LinkMismatch {
                index,
                expected: previous.hash.clone(),
                found: current.previous_hash.clone(),
            });
        }
        None
    })
}

pub fn validate(chain: &[Block]) -> bool {
    first_fault(chain).is_none()
}

pub fn inspect(chain: &[Block]) -> ChainReport {
    let fault = first_fault(chain);
    if let Some(fault) = &fault {
        warn!(?fault, blocks = chain.len(), "chain verification failed");
    }
    ChainReport {
        is_valid: fault.is_none(),
        block_count: chain.len(),
        fault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(len: usize) -> Vec<Block> {
        let mut chain: Vec<Block> = Vec::with_capacity(len);
        for i in 0..len {
            let prev = chain.last().map(|b| b.hash.clone()).unwrap_or_else(|| "0".into());
            let mut block = Block::new(
                format!("2024-01-01T00:00:{:02}.000Z", i),
                json!({ "seq": i }),
                prev,
            );
            block.mine(1);
            chain.push(block);
        }
        chain
    }

    #[test]
    fn empty_and_single_chains_are_valid() {
        assert!(validate(&[]));
        assert!(validate(&build(1)));
        let mut lone = build(1);
        lone[0].hash = "forged".into();
        assert!(validate(&lone));
    }

    #[test]
    fn honest_chain_is_valid() {
        let chain = build(6);
        assert!(validate(&chain));
        let report = inspect(&chain);
        assert!(report.is_valid);
        assert_eq!(report.block_count, 6);
        assert!(report.fault.is_none());
    }

    #[test]
    fn tampered_payload_is_caught() {
        let mut chain = build(4);
        chain[2].data = json!({ "seq": 99 });
        assert!(!validate(&chain));
        assert!(matches!(
            first_fault(&chain),
            Some(ChainFault::HashMismatch { index: 2, .. })
        ));
    }

    #[test]
    fn relinked_without_rehash_is_caught() {
        let mut chain = build(4);
        chain.remove(1);
        assert!(matches!(
            first_fault(&chain),
            Some(ChainFault::LinkMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn forged_hash_is_caught_in_its_own_iteration() {
        let mut chain = build(4);
        let forged = "00".repeat(32);
        chain[2].hash = forged.clone();
        chain[3].previous_hash = forged;
        let fault = first_fault(&chain).unwrap();
        assert_eq!(fault.index(), 2);
        assert!(matches!(fault, ChainFault::HashMismatch { .. }));
    }

    #[test]
    fn report_serializes_camel_case() {
        let mut chain = build(3);
        chain[1].nonce += 1;
        let value = serde_json::to_value(inspect(&chain)).unwrap();
        assert_eq!(value["isValid"], json!(false));
        assert_eq!(value["blockCount"], json!(3));
        assert_eq!(value["fault"]["kind"], json!("hashMismatch"));
        assert_eq!(value["fault"]["index"], json!(1));
    }
}

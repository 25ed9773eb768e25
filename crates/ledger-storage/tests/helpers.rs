#![allow(dead_code)]

use std::fs;

use ledger_core::Block;
use ledger_storage::SledStore;
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// A linked, difficulty-1 chain of `len` blocks with `{ "seq": i }` payloads.
pub fn mined_chain(len: usize) -> Vec<Block> {
    let mut chain: Vec<Block> = Vec::with_capacity(len);
    for i in 0..len {
        let prev = chain
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| "0".to_string());
        let mut block = Block::new(
            format!("2024-01-01T00:00:{:02}.000Z", i % 60),
            json!({ "seq": i }),
            prev,
        );
        block.mine(1);
        chain.push(block);
    }
    chain
}

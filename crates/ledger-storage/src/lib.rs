//! Durable backends for the `ledger_core::LedgerStore` port.

pub mod sled_store;

pub use sled_store::SledStore;

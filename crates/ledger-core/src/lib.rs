//! Tamper-evident, proof-of-work linked ledger of opaque records.
//!
//! Each [`Block`] commits to its predecessor's hash, so editing or removing
//! anything in the middle of the chain invalidates everything after it until
//! the [`Ledger`] re-links and re-mines the suffix.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod pow;
pub mod store;

pub use block::{canonical_timestamp, Block, Payload};
pub use chain::{ChainFault, ChainReport};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, Removal};
pub use pow::CancelToken;
pub use store::{LedgerStore, MemoryStore, Repair, Rewrite, StoreError};

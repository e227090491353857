pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod stats;
pub mod storage;

pub use crate::core::{ContractRelayKeys, KeyStrategy, KeyTriple, ShareToken, Token};
pub use crate::error::StoreError;
pub use crate::index::TokenStore;
pub use crate::stats::StoreStats;
pub use crate::storage::{FsDir, MemoryStore, RecordStore, StorageError};

//! weaveindex-core — foundation for the finality-aware block/transaction index.
//!
//! # Architecture
//!
//! ```text
//! chain source ──► Block / Transaction (wire form)
//!                      │
//!                      ▼
//!                 IngestBatch::prepare      (transcode, hash, index; pure)
//!                      │
//! BlockImporter ──► ChainDatabase
//!                      ├── save_block_and_txs  → new_* region
//!                      ├── flush(depth)        → new_* ⇒ stable_*
//!                      └── get_debug_info      → row counts
//!
//! query layer ◄── cursor::{encode,decode}_*_cursor
//! ```

pub mod batch;
pub mod content;
pub mod cursor;
pub mod error;
pub mod importer;
pub mod indexer;
pub mod store;
pub mod transcode;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use batch::IngestBatch;
pub use content::{ContentStore, ContentTable};
pub use cursor::{
    decode_block_cursor, decode_transaction_cursor, encode_block_cursor,
    encode_transaction_cursor, TransactionCursor,
};
pub use error::IndexerError;
pub use importer::{BlockImporter, ImportOutcome};
pub use indexer::IndexerConfig;
pub use store::{ChainDatabase, DebugInfo};
pub use types::{Block, Tag, Transaction};

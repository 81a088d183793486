//! The storage seam: what a backend must provide for ingestion, promotion
//! and health reporting.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::{Block, Transaction};

/// Table names shared by every backend.
pub mod tables {
    pub const NEW_BLOCKS: &str = "new_blocks";
    pub const NEW_BLOCK_HEIGHTS: &str = "new_block_heights";
    pub const NEW_TRANSACTIONS: &str = "new_transactions";
    pub const NEW_BLOCK_TRANSACTIONS: &str = "new_block_transactions";
    pub const NEW_TRANSACTION_TAGS: &str = "new_transaction_tags";
    pub const STABLE_BLOCKS: &str = "stable_blocks";
    pub const STABLE_TRANSACTIONS: &str = "stable_transactions";
    pub const STABLE_BLOCK_TRANSACTIONS: &str = "stable_block_transactions";
    pub const STABLE_TRANSACTION_TAGS: &str = "stable_transaction_tags";
    pub const TAG_NAMES: &str = "tag_names";
    pub const TAG_VALUES: &str = "tag_values";
    pub const WALLETS: &str = "wallets";
    pub const MISSING_TRANSACTIONS: &str = "missing_transactions";

    /// Every table reported by `get_debug_info`.
    pub const ALL: [&str; 13] = [
        NEW_BLOCKS,
        NEW_BLOCK_HEIGHTS,
        NEW_TRANSACTIONS,
        NEW_BLOCK_TRANSACTIONS,
        NEW_TRANSACTION_TAGS,
        STABLE_BLOCKS,
        STABLE_TRANSACTIONS,
        STABLE_BLOCK_TRANSACTIONS,
        STABLE_TRANSACTION_TAGS,
        TAG_NAMES,
        TAG_VALUES,
        WALLETS,
        MISSING_TRANSACTIONS,
    ];
}

/// Row counts per table, taken from one committed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub counts: BTreeMap<String, u64>,
}

impl DebugInfo {
    /// Row count for `table`; zero for unknown tables.
    pub fn count(&self, table: &str) -> u64 {
        self.counts.get(table).copied().unwrap_or(0)
    }
}

/// A durable chain index split into a new (unconfirmed) and a stable
/// (confirmed) region.
///
/// Implementations: `InMemoryStorage` and `SqliteStorage` in
/// `weaveindex-storage`.
#[async_trait]
pub trait ChainDatabase: Send + Sync {
    /// Atomically write one block, its supplied transactions and tags, and
    /// placeholders for `missing_tx_ids` into the new region.
    ///
    /// Re-ingesting identical input is a no-op. Any failure writes nothing.
    async fn save_block_and_txs(
        &self,
        block: &Block,
        txs: &[Transaction],
        missing_tx_ids: &[String],
    ) -> Result<(), IndexerError>;

    /// Promote every new-region block at or below
    /// `max_height - confirmation_depth` to the stable region.
    ///
    /// Returns the number of blocks promoted.
    async fn flush(&self, confirmation_depth: u64) -> Result<u64, IndexerError>;

    /// Row counts for every table in [`tables::ALL`].
    async fn get_debug_info(&self) -> Result<DebugInfo, IndexerError>;

    /// Highest height across both regions.
    async fn get_max_height(&self) -> Result<Option<u64>, IndexerError>;

    /// Indep hash of the new-region block at `height`.
    async fn get_new_block_hash_by_height(
        &self,
        height: u64,
    ) -> Result<Option<Vec<u8>>, IndexerError>;

    /// Base64url ids of missing transactions, lowest height first.
    async fn get_missing_tx_ids(&self, limit: u32) -> Result<Vec<String>, IndexerError>;
}

/// Highest height eligible for promotion, or `None` when nothing is.
pub fn promotion_cutoff(max_height: u64, confirmation_depth: u64) -> Option<u64> {
    max_height.checked_sub(confirmation_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff() {
        assert_eq!(promotion_cutoff(200, 51), Some(149));
        assert_eq!(promotion_cutoff(10, 10), Some(0));
        assert_eq!(promotion_cutoff(5, 10), None);
        assert_eq!(promotion_cutoff(0, 0), Some(0));
    }

    #[test]
    fn debug_info_unknown_table_is_zero() {
        let mut info = DebugInfo::default();
        info.counts.insert(tables::NEW_BLOCKS.into(), 3);
        assert_eq!(info.count(tables::NEW_BLOCKS), 3);
        assert_eq!(info.count("nope"), 0);
    }
}

//! Block importer: drives ingestion and promotion against a
//! [`ChainDatabase`].
//!
//! Callers feed blocks in ascending height order, one at a time:
//!
//! ```text
//! import(block, txs, missing)
//!   ├── save_block_and_txs   (new region, one transaction)
//!   └── flush(depth)         (when flush_after_ingest; one transaction)
//! ```
//!
//! Each step is all-or-nothing. A failed import may be retried as a whole.

use tracing::{debug, info};

use crate::error::IndexerError;
use crate::indexer::IndexerConfig;
use crate::store::ChainDatabase;
use crate::types::{Block, Transaction};

/// Result of importing one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub height: u64,
    /// Blocks promoted to the stable region by the follow-up flush.
    pub promoted: u64,
}

/// Feeds blocks into a database and keeps the new region bounded.
pub struct BlockImporter<D> {
    db: D,
    config: IndexerConfig,
}

impl<D: ChainDatabase> BlockImporter<D> {
    pub fn new(db: D, config: IndexerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn into_database(self) -> D {
        self.db
    }

    /// Ingest one block and, if configured, promote whatever became final.
    pub async fn import(
        &self,
        block: &Block,
        txs: &[Transaction],
        missing_tx_ids: &[String],
    ) -> Result<ImportOutcome, IndexerError> {
        self.db.save_block_and_txs(block, txs, missing_tx_ids).await?;
        debug!(
            height = block.height,
            txs = txs.len(),
            missing = missing_tx_ids.len(),
            "block imported"
        );

        let promoted = if self.config.flush_after_ingest {
            self.flush().await?
        } else {
            0
        };

        Ok(ImportOutcome {
            height: block.height,
            promoted,
        })
    }

    /// Promote blocks buried under at least `confirmation_depth` blocks.
    pub async fn flush(&self) -> Result<u64, IndexerError> {
        let promoted = self.db.flush(self.config.confirmation_depth).await?;
        if promoted > 0 {
            info!(
                promoted,
                depth = self.config.confirmation_depth,
                "promoted blocks to stable"
            );
        }
        Ok(promoted)
    }
}

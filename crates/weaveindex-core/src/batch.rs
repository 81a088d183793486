//! Ingestion batches: one block's complete write set, transcoded up front.
//!
//! Preparing the batch is pure: every wire value is converted before a
//! storage transaction is opened, so a malformed record aborts ingestion with
//! nothing written.

use std::collections::HashMap;

use crate::content::{ContentEntry, ContentTable};
use crate::error::IndexerError;
use crate::transcode::{b64url_to_bytes, BlockRow, TransactionRow};
use crate::types::{Block, Transaction};

/// Link between a block and one of its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransactionRow {
    pub block_indep_hash: Vec<u8>,
    pub transaction_id: Vec<u8>,
    pub block_transaction_index: i64,
}

/// One tag of one transaction, by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionTagRow {
    pub transaction_id: Vec<u8>,
    pub transaction_tag_index: i64,
    pub tag_name_hash: Vec<u8>,
    pub tag_value_hash: Vec<u8>,
}

/// Placeholder for a transaction a block references but that was not supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTransactionRow {
    pub block_indep_hash: Vec<u8>,
    pub block_transaction_index: i64,
    pub transaction_id: Vec<u8>,
    pub height: i64,
}

/// Every row one call to `save_block_and_txs` writes.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub block: BlockRow,
    pub transactions: Vec<TransactionRow>,
    pub block_transactions: Vec<BlockTransactionRow>,
    pub transaction_tags: Vec<TransactionTagRow>,
    pub tag_names: Vec<ContentEntry>,
    pub tag_values: Vec<ContentEntry>,
    pub wallets: Vec<ContentEntry>,
    pub missing: Vec<MissingTransactionRow>,
}

impl IngestBatch {
    /// Transcode a block, its supplied transactions, and the ids of the ones
    /// that could not be fetched.
    ///
    /// `block_transaction_index` is the id's position in `block.txs`. When
    /// the block carries no tx list, supplied transactions take their array
    /// position and missing ids are numbered after them.
    pub fn prepare(
        block: &Block,
        txs: &[Transaction],
        missing_tx_ids: &[String],
    ) -> Result<Self, IndexerError> {
        let block_row = BlockRow::try_from(block)?;
        let positions: HashMap<&str, usize> = block
            .txs
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let index_of = |id: &str, fallback: usize| -> Result<i64, IndexerError> {
            if positions.is_empty() {
                return Ok(fallback as i64);
            }
            positions.get(id).map(|&i| i as i64).ok_or_else(|| {
                IndexerError::Transcode {
                    field: "txs",
                    reason: format!("transaction {id} is not listed in block {}", block.indep_hash),
                }
            })
        };

        let mut batch = Self {
            block: block_row,
            transactions: Vec::with_capacity(txs.len()),
            block_transactions: Vec::with_capacity(txs.len()),
            transaction_tags: Vec::new(),
            tag_names: Vec::new(),
            tag_values: Vec::new(),
            wallets: Vec::with_capacity(txs.len()),
            missing: Vec::with_capacity(missing_tx_ids.len()),
        };

        for (i, tx) in txs.iter().enumerate() {
            let row = TransactionRow::try_from(tx)?;

            batch.wallets.push(ContentEntry {
                hash: row.owner_address.clone(),
                content: row.owner.clone(),
            });
            batch.block_transactions.push(BlockTransactionRow {
                block_indep_hash: batch.block.indep_hash.clone(),
                transaction_id: row.id.clone(),
                block_transaction_index: index_of(&tx.id, i)?,
            });

            for (j, tag) in tx.tags.iter().enumerate() {
                let name = ContentEntry::new(
                    ContentTable::TagNames,
                    b64url_to_bytes("tag_name", &tag.name)?,
                );
                let value = ContentEntry::new(
                    ContentTable::TagValues,
                    b64url_to_bytes("tag_value", &tag.value)?,
                );
                batch.transaction_tags.push(TransactionTagRow {
                    transaction_id: row.id.clone(),
                    transaction_tag_index: j as i64,
                    tag_name_hash: name.hash.clone(),
                    tag_value_hash: value.hash.clone(),
                });
                batch.tag_names.push(name);
                batch.tag_values.push(value);
            }

            batch.transactions.push(row);
        }

        for (i, id) in missing_tx_ids.iter().enumerate() {
            batch.missing.push(MissingTransactionRow {
                block_indep_hash: batch.block.indep_hash.clone(),
                block_transaction_index: index_of(id, txs.len() + i)?,
                transaction_id: b64url_to_bytes("missing_tx_id", id)?,
                height: batch.block.height,
            });
        }

        Ok(batch)
    }

    pub fn height(&self) -> i64 {
        self.block.height
    }
}

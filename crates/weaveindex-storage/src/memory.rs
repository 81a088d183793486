//! In-memory storage backend.
//!
//! Mirrors the relational layout of the SQLite backend with ordered maps:
//! both regions, the interning tables, and the missing-transaction
//! placeholders. Useful for tests and short-lived indexers that don't need
//! persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use weaveindex_core::batch::{IngestBatch, MissingTransactionRow, TransactionTagRow};
use weaveindex_core::content::{ContentEntry, ContentStore, ContentTable};
use weaveindex_core::error::IndexerError;
use weaveindex_core::store::{promotion_cutoff, tables, ChainDatabase, DebugInfo};
use weaveindex_core::transcode::{bytes_to_b64url, BlockRow, TransactionRow};
use weaveindex_core::types::{Block, Transaction};

type BlockTxKey = (Vec<u8>, Vec<u8>);

/// A promoted transaction and its position in the chain.
#[derive(Debug, Clone)]
struct StableTransaction {
    height: i64,
    block_transaction_index: i64,
    row: TransactionRow,
}

#[derive(Default)]
struct Regions {
    new_blocks: HashMap<Vec<u8>, BlockRow>,
    new_block_heights: BTreeMap<i64, Vec<u8>>,
    new_transactions: HashMap<Vec<u8>, TransactionRow>,
    new_block_transactions: BTreeMap<BlockTxKey, i64>,
    new_transaction_tags: BTreeMap<(Vec<u8>, i64), TransactionTagRow>,

    stable_blocks: BTreeMap<i64, BlockRow>,
    stable_block_transactions: BTreeMap<BlockTxKey, i64>,
    stable_transactions: HashMap<Vec<u8>, StableTransaction>,
    stable_transaction_tags: BTreeMap<(i64, i64, i64), TransactionTagRow>,

    content: HashMap<ContentTable, HashMap<Vec<u8>, Vec<u8>>>,
    missing: BTreeMap<BlockTxKey, MissingTransactionRow>,
}

impl Regions {
    fn intern(&mut self, table: ContentTable, entry: &ContentEntry) {
        self.content
            .entry(table)
            .or_default()
            .entry(entry.hash.clone())
            .or_insert_with(|| entry.content.clone());
    }

    fn content_count(&self, table: ContentTable) -> usize {
        self.content.get(&table).map_or(0, HashMap::len)
    }

    fn apply(&mut self, batch: &IngestBatch) {
        let block = &batch.block;
        self.new_blocks
            .entry(block.indep_hash.clone())
            .or_insert_with(|| block.clone());
        self.new_block_heights
            .insert(block.height, block.indep_hash.clone());

        for wallet in &batch.wallets {
            self.intern(ContentTable::Wallets, wallet);
        }
        for name in &batch.tag_names {
            self.intern(ContentTable::TagNames, name);
        }
        for value in &batch.tag_values {
            self.intern(ContentTable::TagValues, value);
        }

        for tx in &batch.transactions {
            self.new_transactions
                .entry(tx.id.clone())
                .or_insert_with(|| tx.clone());
        }
        for link in &batch.block_transactions {
            self.new_block_transactions
                .entry((link.block_indep_hash.clone(), link.transaction_id.clone()))
                .or_insert(link.block_transaction_index);
        }
        for tag in &batch.transaction_tags {
            self.new_transaction_tags
                .entry((tag.transaction_id.clone(), tag.transaction_tag_index))
                .or_insert_with(|| tag.clone());
        }
        for missing in &batch.missing {
            self.missing
                .entry((missing.block_indep_hash.clone(), missing.transaction_id.clone()))
                .or_insert_with(|| missing.clone());
        }
    }

    /// Links of `block`, as `(transaction_id, block_transaction_index)`.
    fn new_links_of(&self, block: &[u8]) -> Vec<(Vec<u8>, i64)> {
        self.new_block_transactions
            .range((block.to_vec(), Vec::new())..)
            .take_while(|((b, _), _)| b.as_slice() == block)
            .map(|((_, tx), &i)| (tx.clone(), i))
            .collect()
    }

    fn new_tags_of(&self, tx: &[u8]) -> Vec<TransactionTagRow> {
        self.new_transaction_tags
            .range((tx.to_vec(), i64::MIN)..)
            .take_while(|((t, _), _)| t.as_slice() == tx)
            .map(|(_, tag)| tag.clone())
            .collect()
    }

    fn promote_through(&mut self, cutoff: i64) -> u64 {
        let canonical: Vec<(i64, Vec<u8>)> = self
            .new_block_heights
            .range(..=cutoff)
            .map(|(&h, hash)| (h, hash.clone()))
            .collect();

        let mut promoted = 0;
        for (height, hash) in canonical {
            if let Some(block) = self.new_blocks.get(&hash) {
                if !self.stable_blocks.contains_key(&height) {
                    self.stable_blocks.insert(height, block.clone());
                    promoted += 1;
                }
            }
            // A late candidate for an already-stable height brings nothing along.
            let holds_height = self
                .stable_blocks
                .get(&height)
                .is_some_and(|b| b.indep_hash == hash);
            if !holds_height {
                continue;
            }

            for (tx_id, index) in self.new_links_of(&hash) {
                self.stable_block_transactions
                    .entry((hash.clone(), tx_id.clone()))
                    .or_insert(index);

                if let Some(row) = self.new_transactions.get(&tx_id) {
                    let row = row.clone();
                    self.stable_transactions
                        .entry(tx_id.clone())
                        .or_insert(StableTransaction {
                            height,
                            block_transaction_index: index,
                            row,
                        });
                }
                for tag in self.new_tags_of(&tx_id) {
                    self.stable_transaction_tags
                        .entry((height, index, tag.transaction_tag_index))
                        .or_insert(tag);
                }
            }
        }

        // Every block in the promoted range leaves the new region, including
        // candidates that lost their height; then whatever they orphaned.
        let doomed: HashSet<Vec<u8>> = self
            .new_blocks
            .iter()
            .filter(|(_, b)| b.height <= cutoff)
            .map(|(hash, _)| hash.clone())
            .collect();
        self.new_block_transactions
            .retain(|(block, _), _| !doomed.contains(block));

        let linked: HashSet<Vec<u8>> = self
            .new_block_transactions
            .keys()
            .map(|(_, tx)| tx.clone())
            .collect();
        self.new_transaction_tags
            .retain(|(tx, _), _| linked.contains(tx));
        self.new_transactions.retain(|id, _| linked.contains(id));

        self.new_block_heights = match cutoff.checked_add(1) {
            Some(first_kept) => self.new_block_heights.split_off(&first_kept),
            None => BTreeMap::new(),
        };
        self.new_blocks.retain(|_, b| b.height > cutoff);

        promoted
    }

    fn counts(&self) -> [(&'static str, usize); 13] {
        [
            (tables::NEW_BLOCKS, self.new_blocks.len()),
            (tables::NEW_BLOCK_HEIGHTS, self.new_block_heights.len()),
            (tables::NEW_TRANSACTIONS, self.new_transactions.len()),
            (tables::NEW_BLOCK_TRANSACTIONS, self.new_block_transactions.len()),
            (tables::NEW_TRANSACTION_TAGS, self.new_transaction_tags.len()),
            (tables::STABLE_BLOCKS, self.stable_blocks.len()),
            (tables::STABLE_TRANSACTIONS, self.stable_transactions.len()),
            (tables::STABLE_BLOCK_TRANSACTIONS, self.stable_block_transactions.len()),
            (tables::STABLE_TRANSACTION_TAGS, self.stable_transaction_tags.len()),
            (tables::TAG_NAMES, self.content_count(ContentTable::TagNames)),
            (tables::TAG_VALUES, self.content_count(ContentTable::TagValues)),
            (tables::WALLETS, self.content_count(ContentTable::Wallets)),
            (tables::MISSING_TRANSACTIONS, self.missing.len()),
        ]
    }
}

/// In-memory chain index.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    regions: Mutex<Regions>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn regions(&self) -> Result<MutexGuard<'_, Regions>, IndexerError> {
        self.regions
            .lock()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }

    /// Ids of promoted transactions, ordered by height then block position.
    pub fn stable_transaction_ids(&self) -> Result<Vec<Vec<u8>>, IndexerError> {
        let regions = self.regions()?;
        let mut txs: Vec<&StableTransaction> = regions.stable_transactions.values().collect();
        txs.sort_by_key(|t| (t.height, t.block_transaction_index));
        Ok(txs.into_iter().map(|t| t.row.id.clone()).collect())
    }

    /// Indep hash of the promoted block at `height`.
    pub fn stable_block_hash(&self, height: u64) -> Result<Option<Vec<u8>>, IndexerError> {
        let regions = self.regions()?;
        Ok(regions
            .stable_blocks
            .get(&(height as i64))
            .map(|b| b.indep_hash.clone()))
    }

    /// Resolved `(name, value)` pairs of a transaction's tags in original
    /// order, from whichever region holds it.
    pub fn transaction_tags(&self, tx_id: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let regions = self.regions()?;
        let tags: Vec<TransactionTagRow> = match regions.stable_transactions.get(tx_id) {
            Some(stable) => regions
                .stable_transaction_tags
                .range(
                    (stable.height, stable.block_transaction_index, i64::MIN)
                        ..=(stable.height, stable.block_transaction_index, i64::MAX),
                )
                .map(|(_, tag)| tag.clone())
                .collect(),
            None => regions.new_tags_of(tx_id),
        };

        let resolve = |table: ContentTable, hash: &[u8]| -> Result<Vec<u8>, IndexerError> {
            regions
                .content
                .get(&table)
                .and_then(|t| t.get(hash))
                .cloned()
                .ok_or_else(|| {
                    IndexerError::Storage(format!(
                        "{} has no entry for {}",
                        table.table(),
                        bytes_to_b64url(hash)
                    ))
                })
        };

        tags.iter()
            .map(|tag| {
                Ok((
                    resolve(ContentTable::TagNames, &tag.tag_name_hash)?,
                    resolve(ContentTable::TagValues, &tag.tag_value_hash)?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl ChainDatabase for InMemoryStorage {
    async fn save_block_and_txs(
        &self,
        block: &Block,
        txs: &[Transaction],
        missing_tx_ids: &[String],
    ) -> Result<(), IndexerError> {
        let batch = IngestBatch::prepare(block, txs, missing_tx_ids)?;
        self.regions()?.apply(&batch);
        debug!(
            height = block.height,
            txs = batch.transactions.len(),
            missing = batch.missing.len(),
            "block saved"
        );
        Ok(())
    }

    async fn flush(&self, confirmation_depth: u64) -> Result<u64, IndexerError> {
        let mut regions = self.regions()?;

        let Some((&max_height, _)) = regions.new_block_heights.last_key_value() else {
            return Ok(0);
        };
        let Some(cutoff) = promotion_cutoff(max_height as u64, confirmation_depth) else {
            return Ok(0);
        };
        let cutoff = cutoff as i64;

        let stable_max = regions.stable_blocks.last_key_value().map(|(&h, _)| h);
        let new_min = regions.new_block_heights.first_key_value().map(|(&h, _)| h);
        if let (Some(stable_max), Some(new_min)) = (stable_max, new_min) {
            if new_min <= cutoff && new_min > stable_max.saturating_add(1) {
                warn!(stable_max, new_min, "stable height coverage will have a gap");
            }
        }

        let promoted = regions.promote_through(cutoff);
        debug!(max_height, cutoff, promoted, "flushed new blocks to stable");
        Ok(promoted)
    }

    async fn get_debug_info(&self) -> Result<DebugInfo, IndexerError> {
        let regions = self.regions()?;
        let mut info = DebugInfo::default();
        for (table, n) in regions.counts() {
            info.counts.insert(table.to_string(), n as u64);
        }
        Ok(info)
    }

    async fn get_max_height(&self) -> Result<Option<u64>, IndexerError> {
        let regions = self.regions()?;
        let new = regions.new_block_heights.last_key_value().map(|(&h, _)| h);
        let stable = regions.stable_blocks.last_key_value().map(|(&h, _)| h);
        Ok(new.max(stable).map(|h| h as u64))
    }

    async fn get_new_block_hash_by_height(
        &self,
        height: u64,
    ) -> Result<Option<Vec<u8>>, IndexerError> {
        Ok(self.regions()?.new_block_heights.get(&(height as i64)).cloned())
    }

    async fn get_missing_tx_ids(&self, limit: u32) -> Result<Vec<String>, IndexerError> {
        let regions = self.regions()?;
        let mut missing: Vec<&MissingTransactionRow> = regions.missing.values().collect();
        missing.sort_by_key(|m| (m.height, m.block_transaction_index));
        Ok(missing
            .into_iter()
            .take(limit as usize)
            .map(|m| bytes_to_b64url(&m.transaction_id))
            .collect())
    }
}

#[async_trait]
impl ContentStore for InMemoryStorage {
    async fn put(&self, table: ContentTable, content: &[u8]) -> Result<Vec<u8>, IndexerError> {
        let entry = ContentEntry::new(table, content.to_vec());
        self.regions()?.intern(table, &entry);
        Ok(entry.hash)
    }

    async fn get(&self, table: ContentTable, hash: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        Ok(self
            .regions()?
            .content
            .get(&table)
            .and_then(|t| t.get(hash))
            .cloned())
    }
}

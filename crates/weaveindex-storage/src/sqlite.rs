//! SQLite storage backend for WeaveIndex.
//!
//! Persists both regions and the interning tables to a single SQLite file
//! through an `sqlx` pool in WAL mode. Every ingestion and every flush runs
//! inside one SQLite transaction; readers only ever see committed state.
//!
//! # Usage
//! ```rust,no_run
//! use weaveindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./weave.db").await?;
//! store.close().await;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use weaveindex_core::batch::IngestBatch;
use weaveindex_core::content::{ContentEntry, ContentStore, ContentTable};
use weaveindex_core::error::IndexerError;
use weaveindex_core::store::{promotion_cutoff, tables, ChainDatabase, DebugInfo};
use weaveindex_core::transcode::bytes_to_b64url;
use weaveindex_core::types::{Block, Transaction};

use crate::schema::{BLOCK_COLUMNS, SCHEMA_V1, SCHEMA_VERSION, TRANSACTION_COLUMNS};

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

// ─── Connection options ────────────────────────────────────────────────────────

/// Pool options for file-backed databases.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Maximum pooled connections (default: 4). Writes are serialized by
    /// SQLite regardless; extra connections serve concurrent readers.
    pub max_connections: u32,
    /// How long a connection waits on a locked database (default: 5s).
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

// ─── SqliteStorage ─────────────────────────────────────────────────────────────

/// SQLite-backed chain index.
///
/// Cheaply cloneable; clones share the pool.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./weave.db"`) or a full
    /// SQLite URL (`"sqlite:./weave.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        Self::open_with_options(path, SqliteOptions::default()).await
    }

    /// Open with custom pool options.
    pub async fn open_with_options(path: &str, opts: SqliteOptions) -> Result<Self, IndexerError> {
        if path.trim().is_empty() {
            return Err(IndexerError::Config("database path is empty".into()));
        }
        if opts.max_connections == 0 {
            return Err(IndexerError::Config("max_connections must be at least 1".into()));
        }
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let connect = SqliteConnectOptions::from_str(&url)
            .map_err(db_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(opts.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(opts.max_connections)
            .connect_with(connect)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        info!(path, "SqliteStorage opened");
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool is pinned to one long-lived connection, since every SQLite
    /// memory connection is its own database. All data is lost on close.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// The underlying pool, for the query layer's parameterized reads.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection, waiting for in-flight work.
    pub async fn close(self) {
        self.pool.close().await;
        debug!("SqliteStorage closed");
    }

    /// Create tables and indexes, then stamp the schema version.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        if version > SCHEMA_VERSION {
            return Err(IndexerError::Storage(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for statement in SCHEMA_V1 {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        if version < SCHEMA_VERSION {
            info!(version = SCHEMA_VERSION, "initialized schema");
        }
        Ok(())
    }
}

// ─── Ingestion ─────────────────────────────────────────────────────────────────

async fn put_content(
    conn: &mut SqliteConnection,
    table: ContentTable,
    entry: &ContentEntry,
) -> Result<(), IndexerError> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
        table.table(),
        table.key_column(),
        table.content_column()
    );
    sqlx::query(&sql)
        .bind(entry.hash.as_slice())
        .bind(entry.content.as_slice())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Write a prepared batch. Every statement is idempotent, so replaying the
/// same batch leaves the tables unchanged.
async fn write_batch(
    conn: &mut SqliteConnection,
    batch: &IngestBatch,
    indexed_at: i64,
) -> Result<(), IndexerError> {
    let b = &batch.block;
    let (usd_dividend, usd_divisor) = b.usd_to_ar_rate.unzip();
    let (sched_dividend, sched_divisor) = b.scheduled_usd_to_ar_rate.unzip();

    sqlx::query(&format!(
        "INSERT OR IGNORE INTO new_blocks ({BLOCK_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(b.indep_hash.as_slice())
    .bind(b.height)
    .bind(b.previous_block.as_slice())
    .bind(b.nonce.as_slice())
    .bind(b.hash.as_slice())
    .bind(b.block_timestamp)
    .bind(b.last_retarget)
    .bind(b.diff.as_str())
    .bind(b.cumulative_diff.as_deref())
    .bind(b.reward_addr.as_deref())
    .bind(b.reward_pool.as_deref())
    .bind(b.block_size)
    .bind(b.weave_size)
    .bind(usd_dividend)
    .bind(usd_divisor)
    .bind(sched_dividend)
    .bind(sched_divisor)
    .bind(b.hash_list_merkle.as_deref())
    .bind(b.wallet_list.as_slice())
    .bind(b.tx_root.as_deref())
    .bind(b.tx_count)
    .bind(batch.missing.len() as i64)
    .bind(indexed_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    sqlx::query(
        "INSERT INTO new_block_heights (height, block_indep_hash) VALUES (?, ?)
         ON CONFLICT (height) DO UPDATE SET block_indep_hash = excluded.block_indep_hash",
    )
    .bind(b.height)
    .bind(b.indep_hash.as_slice())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    for wallet in &batch.wallets {
        put_content(conn, ContentTable::Wallets, wallet).await?;
    }

    for tx in &batch.transactions {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO new_transactions ({TRANSACTION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(tx.id.as_slice())
        .bind(tx.signature.as_slice())
        .bind(tx.format)
        .bind(tx.last_tx.as_slice())
        .bind(tx.owner_address.as_slice())
        .bind(tx.target.as_slice())
        .bind(tx.quantity.as_str())
        .bind(tx.reward.as_str())
        .bind(tx.data_size)
        .bind(tx.data_root.as_slice())
        .bind(tx.tag_count)
        .bind(indexed_at)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for link in &batch.block_transactions {
        sqlx::query(
            "INSERT OR IGNORE INTO new_block_transactions
             (block_indep_hash, transaction_id, block_transaction_index) VALUES (?, ?, ?)",
        )
        .bind(link.block_indep_hash.as_slice())
        .bind(link.transaction_id.as_slice())
        .bind(link.block_transaction_index)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for name in &batch.tag_names {
        put_content(conn, ContentTable::TagNames, name).await?;
    }
    for value in &batch.tag_values {
        put_content(conn, ContentTable::TagValues, value).await?;
    }

    for tag in &batch.transaction_tags {
        sqlx::query(
            "INSERT OR IGNORE INTO new_transaction_tags
             (tag_name_hash, tag_value_hash, transaction_id, transaction_tag_index)
             VALUES (?, ?, ?, ?)",
        )
        .bind(tag.tag_name_hash.as_slice())
        .bind(tag.tag_value_hash.as_slice())
        .bind(tag.transaction_id.as_slice())
        .bind(tag.transaction_tag_index)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for missing in &batch.missing {
        sqlx::query(
            "INSERT OR IGNORE INTO missing_transactions
             (block_indep_hash, transaction_id, block_transaction_index, height)
             VALUES (?, ?, ?, ?)",
        )
        .bind(missing.block_indep_hash.as_slice())
        .bind(missing.transaction_id.as_slice())
        .bind(missing.block_transaction_index)
        .bind(missing.height)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    Ok(())
}

// ─── Promotion ─────────────────────────────────────────────────────────────────

/// Copy every canonical new-region block at or below `cutoff` into the
/// stable region, then drop the promoted range from the new region.
///
/// Links, transactions and tags follow only blocks that hold their stable
/// height; a late candidate for an already-stable height is discarded.
/// Returns the number of blocks copied.
async fn promote_through(conn: &mut SqliteConnection, cutoff: i64) -> Result<u64, IndexerError> {
    let promoted = sqlx::query(&format!(
        "INSERT OR IGNORE INTO stable_blocks ({BLOCK_COLUMNS})
         SELECT {cols}
         FROM new_blocks nb
         JOIN new_block_heights nbh ON nbh.block_indep_hash = nb.indep_hash
         WHERE nbh.height <= ?
         ORDER BY nbh.height",
        cols = prefixed("nb", BLOCK_COLUMNS),
    ))
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?
    .rows_affected();

    sqlx::query(
        "INSERT OR IGNORE INTO stable_block_transactions
         (block_indep_hash, transaction_id, block_transaction_index)
         SELECT nbt.block_indep_hash, nbt.transaction_id, nbt.block_transaction_index
         FROM new_block_heights nbh
         JOIN stable_blocks sb ON sb.indep_hash = nbh.block_indep_hash
         JOIN new_block_transactions nbt ON nbt.block_indep_hash = nbh.block_indep_hash
         WHERE nbh.height <= ?
         ORDER BY nbh.height, nbt.block_transaction_index",
    )
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    sqlx::query(&format!(
        "INSERT OR IGNORE INTO stable_transactions
         (height, block_transaction_index, {TRANSACTION_COLUMNS})
         SELECT nbh.height, nbt.block_transaction_index, {cols}
         FROM new_block_heights nbh
         JOIN stable_blocks sb ON sb.indep_hash = nbh.block_indep_hash
         JOIN new_block_transactions nbt ON nbt.block_indep_hash = nbh.block_indep_hash
         JOIN new_transactions nt ON nt.id = nbt.transaction_id
         WHERE nbh.height <= ?
         ORDER BY nbh.height, nbt.block_transaction_index",
        cols = prefixed("nt", TRANSACTION_COLUMNS),
    ))
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    sqlx::query(
        "INSERT OR IGNORE INTO stable_transaction_tags
         (tag_name_hash, tag_value_hash, height, block_transaction_index,
          transaction_tag_index, transaction_id)
         SELECT ntt.tag_name_hash, ntt.tag_value_hash, nbh.height,
                nbt.block_transaction_index, ntt.transaction_tag_index, ntt.transaction_id
         FROM new_block_heights nbh
         JOIN stable_blocks sb ON sb.indep_hash = nbh.block_indep_hash
         JOIN new_block_transactions nbt ON nbt.block_indep_hash = nbh.block_indep_hash
         JOIN new_transaction_tags ntt ON ntt.transaction_id = nbt.transaction_id
         WHERE nbh.height <= ?",
    )
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    // Links of every block in the promoted range go first (including
    // candidates that lost their height), then whatever they orphaned.
    sqlx::query(
        "DELETE FROM new_block_transactions WHERE block_indep_hash IN
            (SELECT indep_hash FROM new_blocks WHERE height <= ?)",
    )
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    for orphaned in [
        "DELETE FROM new_transaction_tags WHERE transaction_id NOT IN
            (SELECT transaction_id FROM new_block_transactions)",
        "DELETE FROM new_transactions WHERE id NOT IN
            (SELECT transaction_id FROM new_block_transactions)",
    ] {
        sqlx::query(orphaned)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }
    for promoted_range in [
        "DELETE FROM new_block_heights WHERE height <= ?",
        "DELETE FROM new_blocks WHERE height <= ?",
    ] {
        sqlx::query(promoted_range)
            .bind(cutoff)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
    }

    Ok(promoted)
}

/// `"a, b"` → `"t.a, t.b"`.
fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── ChainDatabase impl ────────────────────────────────────────────────────────

#[async_trait]
impl ChainDatabase for SqliteStorage {
    async fn save_block_and_txs(
        &self,
        block: &Block,
        txs: &[Transaction],
        missing_tx_ids: &[String],
    ) -> Result<(), IndexerError> {
        let batch = IngestBatch::prepare(block, txs, missing_tx_ids)?;
        let indexed_at = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        write_batch(&mut *tx, &batch, indexed_at).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(
            height = block.height,
            txs = batch.transactions.len(),
            tags = batch.transaction_tags.len(),
            missing = batch.missing.len(),
            "block saved"
        );
        Ok(())
    }

    async fn flush(&self, confirmation_depth: u64) -> Result<u64, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let max_height: Option<i64> =
            sqlx::query_scalar("SELECT MAX(height) FROM new_block_heights")
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
        let Some(max_height) = max_height else {
            return Ok(0);
        };
        let Some(cutoff) = promotion_cutoff(max_height as u64, confirmation_depth) else {
            return Ok(0);
        };
        let cutoff = cutoff as i64;

        let row = sqlx::query(
            "SELECT (SELECT MAX(height) FROM stable_blocks) AS stable_max,
                    (SELECT MIN(height) FROM new_block_heights) AS new_min",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let stable_max: Option<i64> = row.get("stable_max");
        let new_min: Option<i64> = row.get("new_min");
        if let (Some(stable_max), Some(new_min)) = (stable_max, new_min) {
            if new_min <= cutoff && new_min > stable_max.saturating_add(1) {
                warn!(stable_max, new_min, "stable height coverage will have a gap");
            }
        }

        let promoted = promote_through(&mut *tx, cutoff).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(max_height, cutoff, promoted, "flushed new blocks to stable");
        Ok(promoted)
    }

    async fn get_debug_info(&self) -> Result<DebugInfo, IndexerError> {
        // A single statement reads from one snapshot.
        let counts = tables::ALL
            .iter()
            .map(|t| format!("(SELECT COUNT(*) FROM {t}) AS {t}"))
            .collect::<Vec<_>>()
            .join(", ");
        let row = sqlx::query(&format!("SELECT {counts}"))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut info = DebugInfo::default();
        for table in tables::ALL {
            let n: i64 = row.try_get(table).map_err(db_err)?;
            info.counts.insert(table.to_string(), n as u64);
        }
        Ok(info)
    }

    async fn get_max_height(&self) -> Result<Option<u64>, IndexerError> {
        let height: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(height) FROM (
                SELECT MAX(height) AS height FROM new_block_heights
                UNION ALL
                SELECT MAX(height) AS height FROM stable_blocks
            )",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(height.map(|h| h as u64))
    }

    async fn get_new_block_hash_by_height(
        &self,
        height: u64,
    ) -> Result<Option<Vec<u8>>, IndexerError> {
        sqlx::query_scalar("SELECT block_indep_hash FROM new_block_heights WHERE height = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn get_missing_tx_ids(&self, limit: u32) -> Result<Vec<String>, IndexerError> {
        let ids: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT transaction_id FROM missing_transactions
             ORDER BY height, block_transaction_index
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ids.iter().map(|id| bytes_to_b64url(id)).collect())
    }
}

// ─── ContentStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl ContentStore for SqliteStorage {
    async fn put(&self, table: ContentTable, content: &[u8]) -> Result<Vec<u8>, IndexerError> {
        let entry = ContentEntry::new(table, content.to_vec());
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        put_content(&mut *conn, table, &entry).await?;
        Ok(entry.hash)
    }

    async fn get(&self, table: ContentTable, hash: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            table.content_column(),
            table.table(),
            table.key_column()
        );
        sqlx::query_scalar(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use weaveindex_core::content::{tag_hash, wallet_address};
    use weaveindex_core::test_util::{make_block, make_chain, make_tx, tx_id};
    use weaveindex_core::transcode::{b64url_to_bytes, columns_to_rational, i64_to_decimal};

    async fn count(store: &SqliteStorage, table: &str) -> u64 {
        store.get_debug_info().await.unwrap().count(table)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn schema_is_versioned_and_reopenable() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        // Running the DDL again is harmless.
        store.init_schema().await.unwrap();
        let info = store.get_debug_info().await.unwrap();
        assert_eq!(info.counts.len(), tables::ALL.len());
        assert!(info.counts.values().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn open_rejects_bad_config() {
        let err = SqliteStorage::open("  ").await.err().unwrap();
        assert!(matches!(err, IndexerError::Config(_)));

        let opts = SqliteOptions {
            max_connections: 0,
            ..Default::default()
        };
        let err = SqliteStorage::open_with_options("unused.db", opts).await.err().unwrap();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn block_columns_are_transcoded() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let block = make_block(982_575, &[]);
        store.save_block_and_txs(&block, &[], &[]).await.unwrap();
        assert_eq!(count(&store, tables::NEW_BLOCKS).await, 1);

        let row = sqlx::query("SELECT * FROM new_blocks WHERE height = ?")
            .bind(982_575i64)
            .fetch_one(store.pool())
            .await
            .unwrap();

        let binary = [
            ("indep_hash", &block.indep_hash),
            ("previous_block", &block.previous_block),
            ("nonce", &block.nonce),
            ("hash", &block.hash),
            ("reward_addr", &block.reward_addr),
            ("wallet_list", &block.wallet_list),
        ];
        for (column, wire) in binary {
            let stored: Vec<u8> = row.get(column);
            assert_eq!(&bytes_to_b64url(&stored), wire, "{column}");
        }
        let hlm: Vec<u8> = row.get("hash_list_merkle");
        assert_eq!(Some(bytes_to_b64url(&hlm)), block.hash_list_merkle);

        let diff: String = row.get("diff");
        assert_eq!(diff, block.diff);
        let timestamp: i64 = row.get("block_timestamp");
        assert_eq!(timestamp, block.timestamp);

        let block_size: i64 = row.get("block_size");
        assert_eq!(Some(i64_to_decimal(block_size)), block.block_size);
        let weave_size: i64 = row.get("weave_size");
        assert_eq!(Some(i64_to_decimal(weave_size)), block.weave_size);

        let rate = columns_to_rational(
            row.get("usd_to_ar_rate_dividend"),
            row.get("usd_to_ar_rate_divisor"),
        );
        assert_eq!(rate.map(Vec::from), block.usd_to_ar_rate);
        let scheduled = columns_to_rational(
            row.get("scheduled_usd_to_ar_rate_dividend"),
            row.get("scheduled_usd_to_ar_rate_divisor"),
        );
        assert_eq!(scheduled.map(Vec::from), block.scheduled_usd_to_ar_rate);

        let height_hash = store.get_new_block_hash_by_height(982_575).await.unwrap();
        assert_eq!(height_hash, Some(b64url_to_bytes("indep_hash", &block.indep_hash).unwrap()));
    }

    #[tokio::test]
    async fn absent_rates_stay_null() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut block = make_block(5, &[]);
        block.usd_to_ar_rate = None;
        block.scheduled_usd_to_ar_rate = None;
        store.save_block_and_txs(&block, &[], &[]).await.unwrap();

        let row = sqlx::query(
            "SELECT usd_to_ar_rate_dividend, usd_to_ar_rate_divisor,
                    scheduled_usd_to_ar_rate_dividend FROM new_blocks",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<Option<i64>, _>("usd_to_ar_rate_dividend"), None);
        assert_eq!(row.get::<Option<i64>, _>("usd_to_ar_rate_divisor"), None);
        assert_eq!(row.get::<Option<i64>, _>("scheduled_usd_to_ar_rate_dividend"), None);
    }

    #[tokio::test]
    async fn transactions_tags_and_owners() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let tags = [("Content-Type", "text/html"), ("App-Name", "weave")];
        let txs = vec![
            make_tx("a", 1, &tags),
            make_tx("b", 1, &tags[..1]),
            make_tx("c", 2, &[]),
        ];
        let block = make_block(982_575, &["a", "b", "c"]);
        store.save_block_and_txs(&block, &txs, &[]).await.unwrap();

        let rows = sqlx::query(
            "SELECT nt.*, nbt.block_transaction_index, w.public_modulus AS owner
             FROM new_transactions nt
             JOIN new_block_transactions nbt ON nbt.transaction_id = nt.id
             JOIN new_block_heights nbh ON nbh.block_indep_hash = nbt.block_indep_hash
             JOIN wallets w ON w.address = nt.owner_address
             WHERE nbh.height = ?
             ORDER BY nbh.height, nbt.block_transaction_index",
        )
        .bind(982_575i64)
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(rows.len(), 3);

        for (i, (row, tx)) in rows.iter().zip(&txs).enumerate() {
            assert_eq!(row.get::<i64, _>("block_transaction_index"), i as i64);
            for (column, wire) in [
                ("id", &tx.id),
                ("signature", &tx.signature),
                ("last_tx", &tx.last_tx),
                ("owner", &tx.owner),
                ("target", &tx.target),
                ("data_root", &tx.data_root),
            ] {
                let stored: Vec<u8> = row.get(column);
                assert_eq!(&bytes_to_b64url(&stored), wire, "{column}");
            }
            assert_eq!(row.get::<String, _>("quantity"), tx.quantity);
            assert_eq!(row.get::<String, _>("reward"), tx.reward);
            assert_eq!(row.get::<i64, _>("format"), i64::from(tx.format));
            assert_eq!(i64_to_decimal(row.get("data_size")), tx.data_size);

            let owner: Vec<u8> = row.get("owner");
            let address: Vec<u8> = row.get("owner_address");
            assert_eq!(address, wallet_address(&owner));

            let tag_rows = sqlx::query(
                "SELECT ntt.*, tn.name, tv.value
                 FROM new_transaction_tags ntt
                 JOIN tag_names tn ON tn.hash = ntt.tag_name_hash
                 JOIN tag_values tv ON tv.hash = ntt.tag_value_hash
                 WHERE ntt.transaction_id = ?
                 ORDER BY ntt.transaction_tag_index",
            )
            .bind(b64url_to_bytes("id", &tx.id).unwrap())
            .fetch_all(store.pool())
            .await
            .unwrap();
            assert_eq!(tag_rows.len(), tx.tags.len());

            for (tag_row, tag) in tag_rows.iter().zip(&tx.tags) {
                let name: Vec<u8> = tag_row.get("name");
                let value: Vec<u8> = tag_row.get("value");
                assert_eq!(bytes_to_b64url(&name), tag.name);
                assert_eq!(bytes_to_b64url(&value), tag.value);
                assert_eq!(tag_row.get::<Vec<u8>, _>("tag_name_hash"), tag_hash(&name));
                assert_eq!(tag_row.get::<Vec<u8>, _>("tag_value_hash"), tag_hash(&value));
            }
        }

        // Two senders, one shared tag vocabulary.
        assert_eq!(count(&store, tables::WALLETS).await, 2);
        assert_eq!(count(&store, tables::TAG_NAMES).await, 2);
        assert_eq!(count(&store, tables::TAG_VALUES).await, 2);
        assert_eq!(count(&store, tables::NEW_TRANSACTION_TAGS).await, 3);
    }

    #[tokio::test]
    async fn reingestion_is_a_no_op() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let fixture = &make_chain(5..=5)[0];

        store
            .save_block_and_txs(&fixture.block, &fixture.txs, &fixture.missing_tx_ids)
            .await
            .unwrap();
        let before = store.get_debug_info().await.unwrap();
        store
            .save_block_and_txs(&fixture.block, &fixture.txs, &fixture.missing_tx_ids)
            .await
            .unwrap();
        assert_eq!(store.get_debug_info().await.unwrap(), before);
        assert_eq!(before.count(tables::MISSING_TRANSACTIONS), 1);
    }

    #[tokio::test]
    async fn malformed_record_writes_nothing() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let good = make_tx("good", 0, &[("Content-Type", "text/plain")]);
        let mut bad = make_tx("bad", 0, &[]);
        bad.data_size = "18446744073709551616".into();
        let block = make_block(7, &["good", "bad"]);

        let err = store
            .save_block_and_txs(&block, &[good, bad], &[])
            .await
            .unwrap_err();
        assert!(err.is_transcode());

        let info = store.get_debug_info().await.unwrap();
        assert!(info.counts.values().all(|&n| n == 0), "{info:?}");
    }

    #[tokio::test]
    async fn storage_failure_rolls_back_the_block() {
        let store = SqliteStorage::in_memory().await.unwrap();
        // Make the last statement of ingestion fail.
        sqlx::query("DROP TABLE missing_transactions")
            .execute(store.pool())
            .await
            .unwrap();

        let fixture = &make_chain(10..=10)[0];
        let err = store
            .save_block_and_txs(&fixture.block, &fixture.txs, &fixture.missing_tx_ids)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));

        let blocks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM new_blocks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let txs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM new_transactions")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!((blocks, txs), (0, 0));
    }

    #[tokio::test]
    async fn flush_failure_rolls_back() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for f in make_chain(1..=6) {
            store
                .save_block_and_txs(&f.block, &f.txs, &f.missing_tx_ids)
                .await
                .unwrap();
        }
        // Blocks are copied before tags, so the copy fails half way through.
        sqlx::query("DROP TABLE stable_transaction_tags")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.flush(0).await.unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));

        let mut counts = Vec::new();
        for table in ["new_blocks", "new_block_heights", "new_transactions", "stable_blocks"] {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(store.pool())
                .await
                .unwrap();
            counts.push(n);
        }
        assert_eq!(counts, [6, 6, 6, 0]);
    }

    #[tokio::test]
    async fn missing_transactions_are_scoped_to_their_block() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let a = make_tx("a", 0, &[]);
        let block = make_block(12, &["gone-1", "a", "gone-2"]);
        let missing = vec![tx_id("gone-1"), tx_id("gone-2")];
        store.save_block_and_txs(&block, &[a], &missing).await.unwrap();

        let rows = sqlx::query(
            "SELECT block_indep_hash, transaction_id, block_transaction_index
             FROM missing_transactions ORDER BY block_transaction_index",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        let indices: Vec<i64> = rows.iter().map(|r| r.get("block_transaction_index")).collect();
        assert_eq!(indices, vec![0, 2]);
        for row in &rows {
            let hash: Vec<u8> = row.get("block_indep_hash");
            assert_eq!(bytes_to_b64url(&hash), block.indep_hash);
        }
        assert_eq!(store.get_missing_tx_ids(10).await.unwrap(), missing);
        assert_eq!(store.get_missing_tx_ids(1).await.unwrap(), missing[..1]);
    }

    // ── Content store ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn content_store_put_get() {
        let store = SqliteStorage::in_memory().await.unwrap();

        let h1 = store.put(ContentTable::TagNames, b"Content-Type").await.unwrap();
        let h2 = store.put(ContentTable::TagNames, b"Content-Type").await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1, tag_hash(b"Content-Type"));
        assert_eq!(count(&store, tables::TAG_NAMES).await, 1);

        assert_eq!(
            store.get(ContentTable::TagNames, &h1).await.unwrap().as_deref(),
            Some(&b"Content-Type"[..])
        );
        assert!(store.get(ContentTable::TagValues, &h1).await.unwrap().is_none());

        let modulus = vec![9u8; 512];
        let address = store.put(ContentTable::Wallets, &modulus).await.unwrap();
        assert_eq!(address, wallet_address(&modulus));
        assert_eq!(store.get(ContentTable::Wallets, &address).await.unwrap(), Some(modulus));
    }

    // ── Promotion ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn flush_on_empty_database() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert_eq!(store.flush(0).await.unwrap(), 0);
        assert_eq!(store.get_max_height().await.unwrap(), None);
    }

    #[tokio::test]
    async fn flush_respects_depth() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for f in make_chain(1..=10) {
            store
                .save_block_and_txs(&f.block, &f.txs, &f.missing_tx_ids)
                .await
                .unwrap();
        }

        // Too shallow a chain for depth 10.
        assert_eq!(store.flush(10).await.unwrap(), 0);
        assert_eq!(store.flush(4).await.unwrap(), 6);
        assert_eq!(count(&store, tables::STABLE_BLOCKS).await, 6);
        assert_eq!(count(&store, tables::NEW_BLOCKS).await, 4);
        assert_eq!(count(&store, tables::NEW_BLOCK_HEIGHTS).await, 4);
        assert_eq!(store.get_max_height().await.unwrap(), Some(10));

        // Nothing new to promote.
        assert_eq!(store.flush(4).await.unwrap(), 0);
        assert!(store.get_new_block_hash_by_height(6).await.unwrap().is_none());
        assert!(store.get_new_block_hash_by_height(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flush_moves_transactions_and_tags() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for f in make_chain(1..=6) {
            store
                .save_block_and_txs(&f.block, &f.txs, &f.missing_tx_ids)
                .await
                .unwrap();
        }
        let before = store.get_debug_info().await.unwrap();
        store.flush(0).await.unwrap();
        let after = store.get_debug_info().await.unwrap();

        for (new, stable) in [
            (tables::NEW_TRANSACTIONS, tables::STABLE_TRANSACTIONS),
            (tables::NEW_BLOCK_TRANSACTIONS, tables::STABLE_BLOCK_TRANSACTIONS),
            (tables::NEW_TRANSACTION_TAGS, tables::STABLE_TRANSACTION_TAGS),
            (tables::NEW_BLOCKS, tables::STABLE_BLOCKS),
        ] {
            assert_eq!(after.count(stable), before.count(new), "{stable}");
            assert_eq!(after.count(new), 0, "{new}");
        }
        // Interning and placeholders are region-independent.
        assert_eq!(after.count(tables::TAG_NAMES), before.count(tables::TAG_NAMES));
        assert_eq!(
            after.count(tables::MISSING_TRANSACTIONS),
            before.count(tables::MISSING_TRANSACTIONS)
        );

        let row = sqlx::query(
            "SELECT height, block_transaction_index FROM stable_transactions WHERE id = ?",
        )
        .bind(b64url_to_bytes("id", &tx_id("5-1")).unwrap())
        .fetch_one(store.pool())
        .await
        .unwrap();
        // Height 5 lists its missing tx first, then 5-0, 5-1.
        assert_eq!(row.get::<i64, _>("height"), 5);
        assert_eq!(row.get::<i64, _>("block_transaction_index"), 2);
    }

    #[tokio::test]
    async fn superseded_candidate_is_discarded_on_promotion() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let shared = make_tx("shared", 0, &[("Content-Type", "text/plain")]);

        // Two candidates for height 3 carrying the same transaction.
        let mut orphan = make_block(3, &["shared"]);
        orphan.indep_hash = weaveindex_core::test_util::block_hash(3_000);
        let canonical = make_block(3, &["shared"]);
        store.save_block_and_txs(&orphan, &[shared.clone()], &[]).await.unwrap();
        store.save_block_and_txs(&canonical, &[shared], &[]).await.unwrap();
        assert_eq!(count(&store, tables::NEW_BLOCKS).await, 2);
        assert_eq!(count(&store, tables::NEW_BLOCK_TRANSACTIONS).await, 2);

        assert_eq!(store.flush(0).await.unwrap(), 1);
        let stable_hash: Vec<u8> = sqlx::query_scalar("SELECT indep_hash FROM stable_blocks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(bytes_to_b64url(&stable_hash), canonical.indep_hash);

        let info = store.get_debug_info().await.unwrap();
        assert_eq!(info.count(tables::NEW_BLOCKS), 0);
        assert_eq!(info.count(tables::NEW_BLOCK_TRANSACTIONS), 0);
        assert_eq!(info.count(tables::NEW_TRANSACTIONS), 0);
        assert_eq!(info.count(tables::STABLE_BLOCK_TRANSACTIONS), 1);
        assert_eq!(info.count(tables::STABLE_TRANSACTIONS), 1);
    }

    #[tokio::test]
    async fn file_backed_database_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "weaveindex-sqlite-test-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("weave.db");
        let path = path.to_str().unwrap();

        let store = SqliteStorage::open(path).await.unwrap();
        for f in make_chain(1..=3) {
            store
                .save_block_and_txs(&f.block, &f.txs, &f.missing_tx_ids)
                .await
                .unwrap();
        }
        store.flush(1).await.unwrap();
        let before = store.get_debug_info().await.unwrap();
        store.close().await;

        let reopened = SqliteStorage::open(path).await.unwrap();
        assert_eq!(reopened.get_debug_info().await.unwrap(), before);
        assert_eq!(reopened.get_max_height().await.unwrap(), Some(3));
        reopened.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Relational schema for the SQLite backend.
//!
//! Two regions share the interning tables:
//! - `new_*`: recent, still-superseable blocks and their transactions
//! - `stable_*`: promoted, append-only rows keyed by height
//!
//! Binary values are BLOBs, sizes and rates INTEGERs, arbitrary-precision
//! decimals TEXT.

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Columns shared by `new_blocks` and `stable_blocks`, in insert order.
pub const BLOCK_COLUMNS: &str = "indep_hash, height, previous_block, nonce, hash, \
     block_timestamp, last_retarget, diff, cumulative_diff, reward_addr, reward_pool, \
     block_size, weave_size, usd_to_ar_rate_dividend, usd_to_ar_rate_divisor, \
     scheduled_usd_to_ar_rate_dividend, scheduled_usd_to_ar_rate_divisor, \
     hash_list_merkle, wallet_list, tx_root, tx_count, missing_tx_count, indexed_at";

/// Transaction columns copied verbatim from `new_transactions` to
/// `stable_transactions`.
pub const TRANSACTION_COLUMNS: &str = "id, signature, format, last_tx, owner_address, \
     target, quantity, reward, data_size, data_root, tag_count, indexed_at";

/// DDL statements, executed in order on open.
pub const SCHEMA_V1: &[&str] = &[
    // ── Interning ───────────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS wallets (
        address        BLOB PRIMARY KEY,
        public_modulus BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tag_names (
        hash BLOB PRIMARY KEY,
        name BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tag_values (
        hash  BLOB PRIMARY KEY,
        value BLOB NOT NULL
    )",
    // ── New region ──────────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS new_blocks (
        indep_hash                        BLOB    PRIMARY KEY,
        height                            INTEGER NOT NULL,
        previous_block                    BLOB    NOT NULL,
        nonce                             BLOB    NOT NULL,
        hash                              BLOB    NOT NULL,
        block_timestamp                   INTEGER NOT NULL,
        last_retarget                     INTEGER NOT NULL,
        diff                              TEXT    NOT NULL,
        cumulative_diff                   TEXT,
        reward_addr                       BLOB,
        reward_pool                       TEXT,
        block_size                        INTEGER,
        weave_size                        INTEGER,
        usd_to_ar_rate_dividend           INTEGER,
        usd_to_ar_rate_divisor            INTEGER,
        scheduled_usd_to_ar_rate_dividend INTEGER,
        scheduled_usd_to_ar_rate_divisor  INTEGER,
        hash_list_merkle                  BLOB,
        wallet_list                       BLOB    NOT NULL,
        tx_root                           BLOB,
        tx_count                          INTEGER NOT NULL,
        missing_tx_count                  INTEGER NOT NULL,
        indexed_at                        INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS new_blocks_height_idx ON new_blocks (height)",
    "CREATE TABLE IF NOT EXISTS new_block_heights (
        height           INTEGER PRIMARY KEY,
        block_indep_hash BLOB    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS new_transactions (
        id            BLOB    PRIMARY KEY,
        signature     BLOB    NOT NULL,
        format        INTEGER NOT NULL,
        last_tx       BLOB    NOT NULL,
        owner_address BLOB    NOT NULL,
        target        BLOB,
        quantity      TEXT    NOT NULL,
        reward        TEXT    NOT NULL,
        data_size     INTEGER NOT NULL,
        data_root     BLOB,
        tag_count     INTEGER NOT NULL,
        indexed_at    INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS new_transactions_owner_idx
        ON new_transactions (owner_address)",
    "CREATE TABLE IF NOT EXISTS new_block_transactions (
        block_indep_hash        BLOB    NOT NULL,
        transaction_id          BLOB    NOT NULL,
        block_transaction_index INTEGER NOT NULL,
        PRIMARY KEY (block_indep_hash, transaction_id)
    )",
    "CREATE INDEX IF NOT EXISTS new_block_transactions_tx_idx
        ON new_block_transactions (transaction_id)",
    "CREATE TABLE IF NOT EXISTS new_transaction_tags (
        tag_name_hash         BLOB    NOT NULL,
        tag_value_hash        BLOB    NOT NULL,
        transaction_id        BLOB    NOT NULL,
        transaction_tag_index INTEGER NOT NULL,
        PRIMARY KEY (transaction_id, transaction_tag_index)
    )",
    "CREATE INDEX IF NOT EXISTS new_transaction_tags_name_value_idx
        ON new_transaction_tags (tag_name_hash, tag_value_hash)",
    // ── Stable region ───────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS stable_blocks (
        height                            INTEGER PRIMARY KEY,
        indep_hash                        BLOB    NOT NULL UNIQUE,
        previous_block                    BLOB    NOT NULL,
        nonce                             BLOB    NOT NULL,
        hash                              BLOB    NOT NULL,
        block_timestamp                   INTEGER NOT NULL,
        last_retarget                     INTEGER NOT NULL,
        diff                              TEXT    NOT NULL,
        cumulative_diff                   TEXT,
        reward_addr                       BLOB,
        reward_pool                       TEXT,
        block_size                        INTEGER,
        weave_size                        INTEGER,
        usd_to_ar_rate_dividend           INTEGER,
        usd_to_ar_rate_divisor            INTEGER,
        scheduled_usd_to_ar_rate_dividend INTEGER,
        scheduled_usd_to_ar_rate_divisor  INTEGER,
        hash_list_merkle                  BLOB,
        wallet_list                       BLOB    NOT NULL,
        tx_root                           BLOB,
        tx_count                          INTEGER NOT NULL,
        missing_tx_count                  INTEGER NOT NULL,
        indexed_at                        INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stable_block_transactions (
        block_indep_hash        BLOB    NOT NULL,
        transaction_id          BLOB    NOT NULL,
        block_transaction_index INTEGER NOT NULL,
        PRIMARY KEY (block_indep_hash, transaction_id)
    )",
    "CREATE INDEX IF NOT EXISTS stable_block_transactions_tx_idx
        ON stable_block_transactions (transaction_id)",
    "CREATE TABLE IF NOT EXISTS stable_transactions (
        id                      BLOB    PRIMARY KEY,
        height                  INTEGER NOT NULL,
        block_transaction_index INTEGER NOT NULL,
        signature               BLOB    NOT NULL,
        format                  INTEGER NOT NULL,
        last_tx                 BLOB    NOT NULL,
        owner_address           BLOB    NOT NULL,
        target                  BLOB,
        quantity                TEXT    NOT NULL,
        reward                  TEXT    NOT NULL,
        data_size               INTEGER NOT NULL,
        data_root               BLOB,
        tag_count               INTEGER NOT NULL,
        indexed_at              INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS stable_transactions_height_idx
        ON stable_transactions (height, block_transaction_index)",
    "CREATE INDEX IF NOT EXISTS stable_transactions_owner_idx
        ON stable_transactions (owner_address, height, block_transaction_index)",
    "CREATE TABLE IF NOT EXISTS stable_transaction_tags (
        tag_name_hash           BLOB    NOT NULL,
        tag_value_hash          BLOB    NOT NULL,
        height                  INTEGER NOT NULL,
        block_transaction_index INTEGER NOT NULL,
        transaction_tag_index   INTEGER NOT NULL,
        transaction_id          BLOB    NOT NULL,
        PRIMARY KEY (height, block_transaction_index, transaction_tag_index)
    )",
    "CREATE INDEX IF NOT EXISTS stable_transaction_tags_name_value_idx
        ON stable_transaction_tags
            (tag_name_hash, tag_value_hash, height, block_transaction_index)",
    "CREATE INDEX IF NOT EXISTS stable_transaction_tags_tx_idx
        ON stable_transaction_tags (transaction_id)",
    // ── Missing transactions ────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS missing_transactions (
        block_indep_hash        BLOB    NOT NULL,
        transaction_id          BLOB    NOT NULL,
        block_transaction_index INTEGER NOT NULL,
        height                  INTEGER NOT NULL,
        PRIMARY KEY (block_indep_hash, transaction_id)
    )",
    "CREATE INDEX IF NOT EXISTS missing_transactions_tx_idx
        ON missing_transactions (transaction_id)",
    "CREATE INDEX IF NOT EXISTS missing_transactions_height_idx
        ON missing_transactions (height, block_transaction_index)",
];

//! Wire ⇄ storage conversions.
//!
//! | wire                          | storage                         |
//! |-------------------------------|---------------------------------|
//! | base64url string              | raw bytes                       |
//! | decimal string (sizes)        | `i64`                           |
//! | `[dividend, divisor]` strings | two `i64` columns               |
//! | decimal string (diff, amounts)| the same string, never a float  |
//!
//! Every conversion is exact: the storage form converts back to the same wire
//! string. Non-canonical integers (leading zeros, signs, whitespace) are
//! rejected rather than normalised.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::content::wallet_address;
use crate::error::IndexerError;
use crate::types::{Block, Transaction};

/// Unpadded base64url; decoding tolerates trailing padding.
pub const B64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reward address sentinel used by blocks mined before reward addresses
/// existed.
const UNCLAIMED: &str = "unclaimed";

// ─── Primitive conversions ────────────────────────────────────────────────────

/// Decode a base64url binary field.
pub fn b64url_to_bytes(field: &'static str, value: &str) -> Result<Vec<u8>, IndexerError> {
    B64URL
        .decode(value)
        .map_err(|e| IndexerError::transcode(field, format!("invalid base64url: {e}")))
}

/// Encode raw bytes as base64url.
pub fn bytes_to_b64url(bytes: &[u8]) -> String {
    B64URL.encode(bytes)
}

/// Parse a canonical non-negative decimal integer into its `i64` column form.
pub fn decimal_to_i64(field: &'static str, value: &str) -> Result<i64, IndexerError> {
    check_decimal(field, value)?;
    if value.len() > 1 && value.starts_with('0') {
        return Err(IndexerError::transcode(
            field,
            format!("leading zeros in '{value}'"),
        ));
    }
    let n: u64 = value
        .parse()
        .map_err(|_| IndexerError::transcode(field, format!("'{value}' exceeds 64-bit range")))?;
    i64::try_from(n).map_err(|_| {
        IndexerError::transcode(field, format!("'{value}' exceeds 64-bit storage range"))
    })
}

/// Inverse of [`decimal_to_i64`].
pub fn i64_to_decimal(value: i64) -> String {
    value.to_string()
}

/// Split a `[dividend, divisor]` rational into its two column values.
///
/// An absent rational stays absent; it is never coerced to zero.
pub fn rational_to_columns(
    field: &'static str,
    value: Option<&[String]>,
) -> Result<Option<(i64, i64)>, IndexerError> {
    match value {
        None => Ok(None),
        Some([dividend, divisor]) => Ok(Some((
            decimal_to_i64(field, dividend)?,
            decimal_to_i64(field, divisor)?,
        ))),
        Some(other) => Err(IndexerError::transcode(
            field,
            format!("expected [dividend, divisor], got {} elements", other.len()),
        )),
    }
}

/// Inverse of [`rational_to_columns`]. Both columns must be present.
pub fn columns_to_rational(dividend: Option<i64>, divisor: Option<i64>) -> Option<[String; 2]> {
    match (dividend, divisor) {
        (Some(a), Some(b)) => Some([i64_to_decimal(a), i64_to_decimal(b)]),
        _ => None,
    }
}

/// Validate an arbitrary-precision decimal and return it verbatim.
pub fn verbatim_decimal(field: &'static str, value: &str) -> Result<String, IndexerError> {
    check_decimal(field, value)?;
    Ok(value.to_owned())
}

fn check_decimal(field: &'static str, value: &str) -> Result<(), IndexerError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexerError::transcode(
            field,
            format!("'{value}' is not a non-negative decimal integer"),
        ));
    }
    Ok(())
}

fn optional<T>(
    value: Option<&str>,
    f: impl FnOnce(&str) -> Result<T, IndexerError>,
) -> Result<Option<T>, IndexerError> {
    value.map(f).transpose()
}

fn height_to_i64(height: u64) -> Result<i64, IndexerError> {
    i64::try_from(height).map_err(|_| {
        IndexerError::transcode("height", format!("{height} exceeds 64-bit storage range"))
    })
}

// ─── Block row ────────────────────────────────────────────────────────────────

/// A block in storage form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub indep_hash: Vec<u8>,
    pub height: i64,
    pub previous_block: Vec<u8>,
    pub nonce: Vec<u8>,
    pub hash: Vec<u8>,
    pub block_timestamp: i64,
    pub last_retarget: i64,
    pub diff: String,
    pub cumulative_diff: Option<String>,
    pub reward_addr: Option<Vec<u8>>,
    pub reward_pool: Option<String>,
    pub block_size: Option<i64>,
    pub weave_size: Option<i64>,
    pub usd_to_ar_rate: Option<(i64, i64)>,
    pub scheduled_usd_to_ar_rate: Option<(i64, i64)>,
    pub hash_list_merkle: Option<Vec<u8>>,
    pub wallet_list: Vec<u8>,
    pub tx_root: Option<Vec<u8>>,
    pub tx_count: i64,
}

impl TryFrom<&Block> for BlockRow {
    type Error = IndexerError;

    fn try_from(block: &Block) -> Result<Self, Self::Error> {
        let reward_addr = match block.reward_addr.as_str() {
            UNCLAIMED => None,
            addr => Some(b64url_to_bytes("reward_addr", addr)?),
        };

        Ok(Self {
            indep_hash: b64url_to_bytes("indep_hash", &block.indep_hash)?,
            height: height_to_i64(block.height)?,
            previous_block: b64url_to_bytes("previous_block", &block.previous_block)?,
            nonce: b64url_to_bytes("nonce", &block.nonce)?,
            hash: b64url_to_bytes("hash", &block.hash)?,
            block_timestamp: block.timestamp,
            last_retarget: block.last_retarget,
            diff: verbatim_decimal("diff", &block.diff)?,
            cumulative_diff: optional(block.cumulative_diff.as_deref(), |v| {
                verbatim_decimal("cumulative_diff", v)
            })?,
            reward_addr,
            reward_pool: optional(block.reward_pool.as_deref(), |v| {
                verbatim_decimal("reward_pool", v)
            })?,
            block_size: optional(block.block_size.as_deref(), |v| {
                decimal_to_i64("block_size", v)
            })?,
            weave_size: optional(block.weave_size.as_deref(), |v| {
                decimal_to_i64("weave_size", v)
            })?,
            usd_to_ar_rate: rational_to_columns("usd_to_ar_rate", block.usd_to_ar_rate.as_deref())?,
            scheduled_usd_to_ar_rate: rational_to_columns(
                "scheduled_usd_to_ar_rate",
                block.scheduled_usd_to_ar_rate.as_deref(),
            )?,
            hash_list_merkle: optional(block.hash_list_merkle.as_deref(), |v| {
                b64url_to_bytes("hash_list_merkle", v)
            })?,
            wallet_list: b64url_to_bytes("wallet_list", &block.wallet_list)?,
            tx_root: optional(block.tx_root.as_deref(), |v| b64url_to_bytes("tx_root", v))?,
            tx_count: block.txs.len() as i64,
        })
    }
}

// ─── Transaction row ──────────────────────────────────────────────────────────

/// A transaction in storage form.
///
/// `owner` is the raw public modulus; only `owner_address` is written to the
/// transaction table, the modulus itself is interned in the wallet table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRow {
    pub id: Vec<u8>,
    pub signature: Vec<u8>,
    pub format: i64,
    pub last_tx: Vec<u8>,
    pub owner: Vec<u8>,
    pub owner_address: Vec<u8>,
    pub target: Vec<u8>,
    pub quantity: String,
    pub reward: String,
    pub data_size: i64,
    pub data_root: Vec<u8>,
    pub tag_count: i64,
}

impl TryFrom<&Transaction> for TransactionRow {
    type Error = IndexerError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        let owner = b64url_to_bytes("owner", &tx.owner)?;
        Ok(Self {
            id: b64url_to_bytes("id", &tx.id)?,
            signature: b64url_to_bytes("signature", &tx.signature)?,
            format: i64::from(tx.format),
            last_tx: b64url_to_bytes("last_tx", &tx.last_tx)?,
            owner_address: wallet_address(&owner),
            owner,
            target: b64url_to_bytes("target", &tx.target)?,
            quantity: verbatim_decimal("quantity", &tx.quantity)?,
            reward: verbatim_decimal("reward", &tx.reward)?,
            data_size: decimal_to_i64("data_size", &tx.data_size)?,
            data_root: b64url_to_bytes("data_root", &tx.data_root)?,
            tag_count: tx.tags.len() as i64,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

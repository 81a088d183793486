//! Wire-format records as produced by the chain source.
//!
//! Binary fields are base64url strings, sizes are decimal strings, rates are
//! two-element decimal-string arrays. Nothing here is transcoded yet; see
//! [`crate::transcode`] for the storage form.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as served by a chain peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub indep_hash: String,
    pub height: u64,
    pub nonce: String,
    pub previous_block: String,
    pub timestamp: i64,
    pub last_retarget: i64,
    /// Arbitrary-precision difficulty, kept verbatim.
    pub diff: String,
    #[serde(default)]
    pub cumulative_diff: Option<String>,
    pub hash: String,
    /// `"unclaimed"` on early blocks.
    pub reward_addr: String,
    #[serde(default)]
    pub reward_pool: Option<String>,
    #[serde(default)]
    pub block_size: Option<String>,
    #[serde(default)]
    pub weave_size: Option<String>,
    #[serde(default)]
    pub usd_to_ar_rate: Option<Vec<String>>,
    #[serde(default)]
    pub scheduled_usd_to_ar_rate: Option<Vec<String>>,
    #[serde(default)]
    pub hash_list_merkle: Option<String>,
    pub wallet_list: String,
    #[serde(default)]
    pub tx_root: Option<String>,
    /// Ids of every transaction in the block, in block order.
    #[serde(default)]
    pub txs: Vec<String>,
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction as served by a chain peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub signature: String,
    #[serde(default = "default_format")]
    pub format: u8,
    pub last_tx: String,
    /// Owner public modulus.
    pub owner: String,
    #[serde(default)]
    pub target: String,
    /// Currency amount in the smallest unit, kept verbatim.
    pub quantity: String,
    pub reward: String,
    pub data_size: String,
    #[serde(default)]
    pub data_root: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

fn default_format() -> u8 {
    1
}

/// A name/value metadata pair. Both sides are base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

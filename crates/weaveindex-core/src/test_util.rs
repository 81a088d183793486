//! Deterministic fixture builders shared by unit and integration tests.
//!
//! Ids are derived from short labels, so `make_block(h, &["a"])` lists the
//! id of `make_tx("a", ..)`.

use sha2::{Digest, Sha256};

use crate::transcode::bytes_to_b64url;
use crate::types::{Block, Tag, Transaction};

/// `len` deterministic bytes derived from `label`.
pub fn bytes_for(label: &str, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u32;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

/// Base64url transaction id for `label`.
pub fn tx_id(label: &str) -> String {
    bytes_to_b64url(&bytes_for(&format!("tx:{label}"), 32))
}

/// Base64url indep hash for the block at `height`.
pub fn block_hash(height: u64) -> String {
    bytes_to_b64url(&bytes_for(&format!("block:{height}"), 48))
}

/// Base64url public modulus of test wallet `seed`.
pub fn owner(seed: u8) -> String {
    bytes_to_b64url(&bytes_for(&format!("wallet:{seed}"), 512))
}

/// A tag from plain-text name and value.
pub fn tag(name: &str, value: &str) -> Tag {
    Tag {
        name: bytes_to_b64url(name.as_bytes()),
        value: bytes_to_b64url(value.as_bytes()),
    }
}

/// A format-2 transaction owned by wallet `owner_seed`.
pub fn make_tx(label: &str, owner_seed: u8, tags: &[(&str, &str)]) -> Transaction {
    Transaction {
        id: tx_id(label),
        signature: bytes_to_b64url(&bytes_for(&format!("sig:{label}"), 512)),
        format: 2,
        last_tx: bytes_to_b64url(&bytes_for(&format!("anchor:{label}"), 48)),
        owner: owner(owner_seed),
        target: String::new(),
        quantity: "0".into(),
        reward: "1907401227".into(),
        data_size: "1048576".into(),
        data_root: bytes_to_b64url(&bytes_for(&format!("data:{label}"), 32)),
        tags: tags.iter().map(|(n, v)| tag(n, v)).collect(),
    }
}

/// A block at `height` listing the transactions labelled `tx_labels`.
pub fn make_block(height: u64, tx_labels: &[&str]) -> Block {
    Block {
        indep_hash: block_hash(height),
        height,
        nonce: bytes_to_b64url(&bytes_for(&format!("nonce:{height}"), 32)),
        previous_block: if height == 0 {
            String::new()
        } else {
            block_hash(height - 1)
        },
        timestamp: 1_528_500_000 + height as i64 * 120,
        last_retarget: 1_528_500_000 + (height as i64 / 10) * 1200,
        diff: "115792088158918333131516597762172392628570465465856793992332884130307292657121"
            .into(),
        cumulative_diff: Some("5846275723612417462".into()),
        hash: bytes_to_b64url(&bytes_for(&format!("hash:{height}"), 32)),
        reward_addr: bytes_to_b64url(&bytes_for("miner", 32)),
        reward_pool: Some("4209728941257016434".into()),
        block_size: Some((height * 1024).to_string()),
        weave_size: Some((height * 1_048_576).to_string()),
        usd_to_ar_rate: Some(vec!["1".into(), "5".into()]),
        scheduled_usd_to_ar_rate: Some(vec!["1".into(), "4".into()]),
        hash_list_merkle: Some(bytes_to_b64url(&bytes_for(&format!("hlm:{height}"), 48))),
        wallet_list: bytes_to_b64url(&bytes_for(&format!("wallets:{height}"), 48)),
        tx_root: Some(bytes_to_b64url(&bytes_for(&format!("txroot:{height}"), 32))),
        txs: tx_labels.iter().map(|l| tx_id(l)).collect(),
    }
}

/// Input for one `save_block_and_txs` call.
#[derive(Debug, Clone)]
pub struct BlockFixture {
    pub block: Block,
    pub txs: Vec<Transaction>,
    pub missing_tx_ids: Vec<String>,
}

/// A contiguous chain of blocks over `heights`.
///
/// Height `h` lists `h % 3` transactions; every fifth height additionally
/// lists one transaction that is reported missing, placed first in block
/// order. All transactions carry a shared `Content-Type` tag, and owners
/// rotate over three wallets.
pub fn make_chain(heights: std::ops::RangeInclusive<u64>) -> Vec<BlockFixture> {
    heights
        .map(|h| {
            let supplied: Vec<String> = (0..h % 3).map(|i| format!("{h}-{i}")).collect();
            let missing: Vec<String> = if h % 5 == 0 {
                vec![format!("{h}-missing")]
            } else {
                vec![]
            };

            let labels: Vec<&str> = missing
                .iter()
                .chain(supplied.iter())
                .map(String::as_str)
                .collect();
            let block = make_block(h, &labels);

            let txs = supplied
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    make_tx(
                        label,
                        (h % 3) as u8,
                        &[("Content-Type", "text/plain"), ("Index", &i.to_string())],
                    )
                })
                .collect();

            BlockFixture {
                block,
                txs,
                missing_tx_ids: missing.iter().map(|l| tx_id(l)).collect(),
            }
        })
        .collect()
}

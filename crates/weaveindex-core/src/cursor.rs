//! Pagination cursors: opaque tokens marking a resumption point in a
//! height-ordered result set.
//!
//! A cursor is the compact JSON array `[height]` (blocks) or
//! `[height, block_transaction_index]` (transactions), encoded as unpadded
//! base64url. `encode_transaction_cursor(1138, 42)` yields `"WzExMzgsNDJd"`.

use base64::Engine;
use serde_json::Value;

use crate::error::IndexerError;
use crate::transcode::B64URL;

const INVALID_TRANSACTION_CURSOR: &str = "Invalid transaction cursor";
const INVALID_BLOCK_CURSOR: &str = "Invalid block cursor";

/// Decoded position of a transaction cursor.
///
/// Both fields are `None` when no cursor was supplied (start of result set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCursor {
    pub height: Option<u64>,
    pub block_transaction_index: Option<u32>,
}

/// Encode a transaction cursor for `(height, block_transaction_index)`.
pub fn encode_transaction_cursor(height: u64, block_transaction_index: u32) -> String {
    encode_array(&format!("[{height},{block_transaction_index}]"))
}

/// Encode a block cursor for `height`.
pub fn encode_block_cursor(height: u64) -> String {
    encode_array(&format!("[{height}]"))
}

/// Decode a transaction cursor.
///
/// `None` decodes to an empty cursor. Anything that is not a base64url
/// encoded two-element array of non-negative integers fails with
/// `Invalid transaction cursor`.
pub fn decode_transaction_cursor(
    cursor: Option<&str>,
) -> Result<TransactionCursor, IndexerError> {
    let Some(token) = cursor else {
        return Ok(TransactionCursor::default());
    };
    let invalid = || IndexerError::Validation(INVALID_TRANSACTION_CURSOR.into());

    match decode_array(token).as_deref() {
        Some([height, index]) => {
            let height = height.as_u64().ok_or_else(invalid)?;
            let index = index
                .as_u64()
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(invalid)?;
            Ok(TransactionCursor {
                height: Some(height),
                block_transaction_index: Some(index),
            })
        }
        _ => Err(invalid()),
    }
}

/// Decode a block cursor. `None` decodes to `None`.
pub fn decode_block_cursor(cursor: Option<&str>) -> Result<Option<u64>, IndexerError> {
    let Some(token) = cursor else {
        return Ok(None);
    };

    match decode_array(token).as_deref() {
        Some([height]) => height
            .as_u64()
            .map(Some)
            .ok_or_else(|| IndexerError::Validation(INVALID_BLOCK_CURSOR.into())),
        _ => Err(IndexerError::Validation(INVALID_BLOCK_CURSOR.into())),
    }
}

fn encode_array(json: &str) -> String {
    B64URL.encode(json.as_bytes())
}

/// Returns the array elements, or `None` if the token is not a base64url
/// JSON array.
fn decode_array(token: &str) -> Option<Vec<Value>> {
    let bytes = B64URL.decode(token).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

//! Content-addressed interning of tag names, tag values, and wallet keys.
//!
//! Each interning table maps a fixed-width digest of some bytes to the bytes
//! themselves. Identical content always lands on the same key, so storage
//! grows with distinct content rather than with reference count.

use async_trait::async_trait;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::IndexerError;

/// Width of a tag name/value hash (SHA-1).
pub const TAG_HASH_LEN: usize = 20;

/// Width of a wallet address (SHA-256 of the public modulus).
pub const WALLET_ADDRESS_LEN: usize = 32;

/// Hash of a tag name or tag value.
pub fn tag_hash(content: &[u8]) -> Vec<u8> {
    Sha1::digest(content).to_vec()
}

/// Address of the wallet owning `public_modulus`.
pub fn wallet_address(public_modulus: &[u8]) -> Vec<u8> {
    Sha256::digest(public_modulus).to_vec()
}

/// One of the shared interning tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTable {
    TagNames,
    TagValues,
    Wallets,
}

impl ContentTable {
    pub const ALL: [ContentTable; 3] = [Self::TagNames, Self::TagValues, Self::Wallets];

    /// Table name in the relational schema.
    pub fn table(self) -> &'static str {
        match self {
            Self::TagNames => "tag_names",
            Self::TagValues => "tag_values",
            Self::Wallets => "wallets",
        }
    }

    /// Column holding the digest.
    pub fn key_column(self) -> &'static str {
        match self {
            Self::TagNames | Self::TagValues => "hash",
            Self::Wallets => "address",
        }
    }

    /// Column holding the interned bytes.
    pub fn content_column(self) -> &'static str {
        match self {
            Self::TagNames => "name",
            Self::TagValues => "value",
            Self::Wallets => "public_modulus",
        }
    }

    /// Digest `content` with this table's hash function.
    pub fn digest(self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::TagNames | Self::TagValues => tag_hash(content),
            Self::Wallets => wallet_address(content),
        }
    }
}

/// A digest and the bytes it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub hash: Vec<u8>,
    pub content: Vec<u8>,
}

impl ContentEntry {
    pub fn new(table: ContentTable, content: Vec<u8>) -> Self {
        Self {
            hash: table.digest(&content),
            content,
        }
    }
}

/// Key→value interning store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Intern `content`, returning its digest. Storing the same bytes again
    /// is a no-op and never fails.
    async fn put(&self, table: ContentTable, content: &[u8]) -> Result<Vec<u8>, IndexerError>;

    /// Look up interned bytes by digest.
    async fn get(&self, table: ContentTable, hash: &[u8]) -> Result<Option<Vec<u8>>, IndexerError>;

    async fn get_tag_name(&self, hash: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        self.get(ContentTable::TagNames, hash).await
    }

    async fn get_tag_value(&self, hash: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        self.get(ContentTable::TagValues, hash).await
    }

    /// Public modulus of the wallet at `address`.
    async fn get_wallet(&self, address: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        self.get(ContentTable::Wallets, address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_widths() {
        assert_eq!(tag_hash(b"Content-Type").len(), TAG_HASH_LEN);
        assert_eq!(wallet_address(&[7u8; 512]).len(), WALLET_ADDRESS_LEN);
    }

    #[test]
    fn sha1_known_vector() {
        // SHA-1("abc")
        assert_eq!(
            tag_hash(b"abc"),
            [
                0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
                0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d
            ]
        );
    }

    #[test]
    fn identical_content_identical_key() {
        let a = ContentEntry::new(ContentTable::TagNames, b"App-Name".to_vec());
        let b = ContentEntry::new(ContentTable::TagValues, b"App-Name".to_vec());
        assert_eq!(a.hash, b.hash);
        assert_ne!(
            ContentTable::Wallets.digest(b"App-Name"),
            ContentTable::TagNames.digest(b"App-Name")
        );
    }

    #[test]
    fn schema_names() {
        assert_eq!(ContentTable::Wallets.table(), "wallets");
        assert_eq!(ContentTable::Wallets.key_column(), "address");
        assert_eq!(ContentTable::TagValues.content_column(), "value");
    }
}

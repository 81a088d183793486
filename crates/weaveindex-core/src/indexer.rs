//! Indexer configuration.

use serde::{Deserialize, Serialize};

/// Default number of blocks a block must be buried under before promotion.
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 50;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Number of blocks that must follow a block before it is promoted to
    /// the stable region. `0` promotes every block immediately.
    pub confirmation_depth: u64,
    /// Run a flush after every ingested block. When `false` the caller
    /// schedules `flush` itself.
    pub flush_after_ingest: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            flush_after_ingest: true,
        }
    }
}

impl IndexerConfig {
    pub fn with_confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    pub fn with_flush_after_ingest(mut self, enabled: bool) -> Self {
        self.flush_after_ingest = enabled;
        self
    }
}

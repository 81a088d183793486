//! `weaveindex import`: feed JSON-lines block records through a
//! [`BlockImporter`].
//!
//! One record per line:
//! ```json
//! {"block": {...}, "txs": [{...}], "missing_tx_ids": ["..."]}
//! ```
//! Records are imported in file order; blank lines are skipped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use weaveindex_core::{Block, BlockImporter, ChainDatabase, Transaction};

/// One line of an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub block: Block,
    #[serde(default)]
    pub txs: Vec<Transaction>,
    #[serde(default)]
    pub missing_tx_ids: Vec<String>,
}

/// Totals printed after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub blocks: u64,
    pub transactions: u64,
    pub missing: u64,
    pub promoted: u64,
    pub last_height: Option<u64>,
}

pub async fn run<D, R>(importer: &BlockImporter<D>, reader: R) -> Result<ImportSummary>
where
    D: ChainDatabase,
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = ImportSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read import file")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: ImportRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {line_no}: invalid block record"))?;
        let outcome = importer
            .import(&record.block, &record.txs, &record.missing_tx_ids)
            .await
            .with_context(|| {
                format!("line {line_no}: failed to import block {}", record.block.height)
            })?;

        summary.blocks += 1;
        summary.transactions += record.txs.len() as u64;
        summary.missing += record.missing_tx_ids.len() as u64;
        summary.promoted += outcome.promoted;
        summary.last_height = Some(outcome.height);
    }

    Ok(summary)
}

//! Import JSONL message logs into the SQLite store

use anyhow::{Context, Result};
use eventgrep_core::{Message, MessageStore};
use eventgrep_store_sqlite::SqliteMessageStore;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Configuration for message import
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Messages appended per transaction
    pub batch_size: usize,
    /// Skip messages whose id is already stored
    pub skip_existing: bool,
    /// Keep going past lines that fail to parse
    pub continue_on_error: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            skip_existing: true,
            continue_on_error: true,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Append every message in a JSONL file, one `Message` object per line.
///
/// Blank lines are ignored.
pub async fn import_file(
    store: &SqliteMessageStore,
    path: &Path,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    let file = fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<Message> = Vec::with_capacity(batch_size);
    let mut summary = ImportSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read line")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) if options.continue_on_error => {
                warn!(line = line_no, error = %e, "Skipping unparseable message");
                summary.failed += 1;
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Invalid message on line {}", line_no));
            }
        };

        if options.skip_existing
            && (store.get_message(&message.msg_id).await?.is_some()
                || batch.iter().any(|m| m.msg_id == message.msg_id))
        {
            debug!(msg_id = %message.msg_id, "Message already stored");
            summary.skipped += 1;
            continue;
        }

        batch.push(message);
        if batch.len() >= batch_size {
            summary.imported += store.append_batch(&batch).await?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        summary.imported += store.append_batch(&batch).await?;
    }

    info!(
        path = %path.display(),
        imported = summary.imported,
        skipped = summary.skipped,
        failed = summary.failed,
        "Import complete"
    );
    Ok(summary)
}

//! Dump-pending command implementation.

use super::open_store;
use feedsync_engine::{PendingEntry, PendingOp, PendingWriteQueue};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// One queued operation as printed.
#[derive(Debug, Serialize)]
pub struct PendingRow {
    /// Position in replay order, starting at 1.
    pub position: usize,
    /// Collection of the target entity.
    pub collection: &'static str,
    /// Target ID.
    pub id: String,
    /// `put` or `delete`.
    pub op: &'static str,
    /// Queue sequence number.
    pub seq: u64,
    /// Enqueue time in milliseconds since the epoch.
    pub enqueued_at: u64,
    /// Failed replay attempts.
    pub attempts: u32,
    /// The queued snapshot, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Runs the dump-pending command.
pub async fn run(
    path: &Path,
    limit: Option<usize>,
    payloads: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let queue = PendingWriteQueue::load(Arc::clone(&store)).await?;
    let total = queue.len();
    let rows = collect_rows(queue.drain(), limit, payloads);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            println!("Pending operations at {:?}", path);
            println!();
            if rows.is_empty() {
                println!("  (queue is empty)");
            }
            for row in &rows {
                println!(
                    "  #{:<4} {:<6} {}/{}  seq={} attempts={} enqueued_at={}",
                    row.position,
                    row.op,
                    row.collection,
                    row.id,
                    row.seq,
                    row.attempts,
                    row.enqueued_at
                );
                if let Some(payload) = &row.payload {
                    println!("         {payload}");
                }
            }
            if rows.len() < total {
                println!();
                println!("  ... {} more", total - rows.len());
            }
        }
    }

    Ok(())
}

/// Converts queue entries to printable rows, keeping replay order.
pub fn collect_rows(
    entries: Vec<PendingEntry>,
    limit: Option<usize>,
    payloads: bool,
) -> Vec<PendingRow> {
    entries
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, entry)| {
            let (op, payload) = match entry.op {
                PendingOp::Put { payload } => ("put", payloads.then_some(payload)),
                PendingOp::Delete => ("delete", None),
            };
            PendingRow {
                position: index + 1,
                collection: entry.kind.collection(),
                id: entry.id.to_string(),
                op,
                seq: entry.seq,
                enqueued_at: entry.enqueued_at.as_millis(),
                attempts: entry.attempts,
                payload,
            }
        })
        .collect()
}

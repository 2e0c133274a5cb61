//! Tombstones command implementation.

use super::open_store;
use feedsync_engine::{TombstoneEntry, TombstoneRegistry};
use feedsync_model::EntityKind;
use std::path::Path;
use std::sync::Arc;

/// Runs the tombstones command.
pub async fn run(
    path: &Path,
    collection: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = match collection {
        Some(name) => Some(
            EntityKind::from_collection(name).ok_or_else(|| format!("unknown collection: {name}"))?,
        ),
        None => None,
    };

    let store = open_store(path)?;
    let registry = TombstoneRegistry::load(Arc::clone(&store)).await?;
    let entries = select(registry.entries(), kind);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            println!("Tombstones at {:?}", path);
            println!();
            if entries.is_empty() {
                println!("  (none)");
            }
            for entry in &entries {
                let confirmed = entry
                    .remote_confirmed_at
                    .map_or_else(|| "unconfirmed".to_string(), |at| format!("confirmed {at}"));
                println!(
                    "  {}/{}  deleted {}  {}",
                    entry.kind.collection(),
                    entry.id,
                    entry.deleted_at,
                    confirmed
                );
            }
        }
    }

    Ok(())
}

/// Keeps the entries of `kind`, oldest delete first.
pub fn select(mut entries: Vec<TombstoneEntry>, kind: Option<EntityKind>) -> Vec<TombstoneEntry> {
    entries.retain(|e| kind.map_or(true, |k| e.kind == k));
    entries.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at).then_with(|| a.id.cmp(&b.id)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_model::{EntityId, Timestamp};

    fn tombstone(id: &str, kind: EntityKind, at: u64) -> TombstoneEntry {
        TombstoneEntry {
            id: EntityId::from(id),
            kind,
            deleted_at: Timestamp(at),
            remote_confirmed_at: None,
        }
    }

    #[test]
    fn filters_by_kind_and_orders_by_delete_time() {
        let entries = vec![
            tombstone("p2", EntityKind::Post, 20),
            tombstone("c1", EntityKind::Comment, 5),
            tombstone("p1", EntityKind::Post, 10),
        ];

        let posts = select(entries.clone(), Some(EntityKind::Post));
        let ids: Vec<&str> = posts.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        assert_eq!(select(entries, None).len(), 3);
    }
}

//! Newest-wins, tombstone-filtered merge of entity lists.
//!
//! Merge is a pure function over snapshots from several tiers:
//!
//! 1. The union of all IDs, minus tombstoned IDs, minus IDs any copy marks
//!    as deleted, minus children of tombstoned parents
//! 2. Per ID, the copy with the highest `version`; on a version tie the copy
//!    from the later (more authoritative) list wins
//! 3. Sorted by the requested [`MergeOrder`], ties broken by ID
//!
//! The result never depends on the order of entities inside each list.

use crate::entity::{Entity, MergeOrder};
use crate::ids::EntityId;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Merges a local and a remote list using the entity's default order.
///
/// Version ties prefer the remote copy, since the remote store is the durable
/// source of truth.
#[must_use]
pub fn merge<E: Entity>(local: Vec<E>, remote: Vec<E>, tombstones: &HashSet<EntityId>) -> Vec<E> {
    merge_ordered(local, remote, tombstones, E::DEFAULT_ORDER)
}

/// Merges a local and a remote list with an explicit order.
#[must_use]
pub fn merge_ordered<E: Entity>(
    local: Vec<E>,
    remote: Vec<E>,
    tombstones: &HashSet<EntityId>,
    order: MergeOrder,
) -> Vec<E> {
    merge_all([local, remote], tombstones, order)
}

struct Candidate<E> {
    entity: E,
    rank: usize,
}

/// Merges any number of lists, ordered from least to most authoritative.
#[must_use]
pub fn merge_all<E, I>(lists: I, tombstones: &HashSet<EntityId>, order: MergeOrder) -> Vec<E>
where
    E: Entity,
    I: IntoIterator<Item = Vec<E>>,
{
    let lists: Vec<Vec<E>> = lists.into_iter().collect();

    let deleted: HashSet<EntityId> = lists
        .iter()
        .flatten()
        .filter(|e| e.is_deleted())
        .map(|e| e.id().clone())
        .collect();

    let excluded = |entity: &E| {
        let id = entity.id();
        id.is_empty()
            || tombstones.contains(id)
            || deleted.contains(id)
            || entity.parent_id().is_some_and(|p| tombstones.contains(p))
    };

    let mut winners: HashMap<EntityId, Candidate<E>> = HashMap::new();
    for (rank, list) in lists.into_iter().enumerate() {
        for entity in list {
            if excluded(&entity) {
                continue;
            }
            match winners.get_mut(entity.id()) {
                Some(current) => {
                    if beats(&entity, rank, current) {
                        *current = Candidate { entity, rank };
                    }
                }
                None => {
                    winners.insert(entity.id().clone(), Candidate { entity, rank });
                }
            }
        }
    }

    let mut merged: Vec<E> = winners.into_values().map(|c| c.entity).collect();
    sort_entities(&mut merged, order);
    merged
}

/// Returns true if `challenger` from list `rank` replaces `current`.
fn beats<E: Entity>(challenger: &E, rank: usize, current: &Candidate<E>) -> bool {
    match challenger.version().cmp(&current.entity.version()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match rank.cmp(&current.rank) {
            Ordering::Greater => true,
            Ordering::Less => false,
            // Same tier, same version: pick by content so input order is irrelevant.
            Ordering::Equal => canonical(challenger) > canonical(&current.entity),
        },
    }
}

fn canonical<E: Entity>(entity: &E) -> String {
    serde_json::to_string(entity).unwrap_or_default()
}

/// Sorts entities in place by `order`, falling back to ID.
pub fn sort_entities<E: Entity>(entities: &mut [E], order: MergeOrder) {
    match order {
        MergeOrder::CreatedDesc => entities.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        }),
        MergeOrder::CreatedAsc => entities.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        }),
        MergeOrder::ById => entities.sort_by(|a, b| a.id().cmp(b.id())),
    }
}

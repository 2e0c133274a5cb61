//! The social entities synchronized by FeedSync.

mod comment;
mod follow;
mod post;
mod profile;

pub use comment::Comment;
pub use follow::FollowEdge;
pub use post::Post;
pub use profile::UserProfile;

use crate::error::{ModelError, ModelResult};
use crate::ids::EntityId;

/// Rejects IDs that cannot be used as a single path segment.
fn check_id(kind: &'static str, field: &str, id: &EntityId) -> ModelResult<()> {
    if id.as_str().contains('/') {
        return Err(ModelError::invalid(
            kind,
            format!("{field} {id} must not contain '/'"),
        ));
    }
    Ok(())
}

/// Rejects references that were never filled in.
fn require(kind: &'static str, field: &str, id: &EntityId) -> ModelResult<()> {
    if id.is_empty() {
        return Err(ModelError::invalid(kind, format!("{field} is required")));
    }
    check_id(kind, field, id)
}

/// Applies a signed delta to a counter, clamping at zero.
fn apply_delta(count: u64, delta: i64) -> u64 {
    if delta >= 0 {
        count.saturating_add(delta.unsigned_abs())
    } else {
        count.saturating_sub(delta.unsigned_abs())
    }
}

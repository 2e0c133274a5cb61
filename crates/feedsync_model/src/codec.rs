//! JSON record codec shared by the local cache and the remote store.
//!
//! Every entity lives in exactly one canonical record:
//!
//! ```text
//! <collection>/<id>      e.g. posts/5f0c…, profiles/alice
//! ```
//!
//! The same string is the LocalStore key and the RemoteStore path.

use crate::entity::{Entity, EntityKind};
use crate::error::{ModelError, ModelResult};
use crate::ids::EntityId;
use serde_json::Value;

/// Returns the local key of an entity record.
#[must_use]
pub fn record_key(kind: EntityKind, id: &EntityId) -> String {
    format!("{}/{}", kind.collection(), id)
}

/// Returns the key prefix shared by every record of `kind`.
#[must_use]
pub fn record_prefix(kind: EntityKind) -> String {
    format!("{}/", kind.collection())
}

/// Returns the remote path of an entity record.
#[must_use]
pub fn remote_path(kind: EntityKind, id: &EntityId) -> String {
    record_key(kind, id)
}

/// Encodes an entity as a JSON record.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_record<E: Entity>(entity: &E) -> ModelResult<String> {
    Ok(serde_json::to_string(entity)?)
}

/// Decodes the record stored at `key`.
///
/// A record without an `id` field takes the ID from the last key segment.
///
/// # Errors
///
/// Returns [`ModelError::InvalidRecord`] if the record is not a valid `E`.
pub fn decode_record<E: Entity>(key: &str, raw: &str) -> ModelResult<E> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ModelError::invalid_record(key, e.to_string()))?;
    decode_value(key, value)
}

/// Decodes one JSON value read from `key`.
///
/// # Errors
///
/// Returns [`ModelError::InvalidRecord`] if the value is not a valid `E`.
pub fn decode_value<E: Entity>(key: &str, value: Value) -> ModelResult<E> {
    let mut entity: E =
        serde_json::from_value(value).map_err(|e| ModelError::invalid_record(key, e.to_string()))?;
    if entity.id().is_empty() {
        let fallback = key.rsplit('/').next().unwrap_or_default();
        entity = reassign_id(entity, fallback)?;
    }
    Ok(entity)
}

fn reassign_id<E: Entity>(entity: E, id: &str) -> ModelResult<E> {
    let mut value = serde_json::to_value(&entity)?;
    if let Value::Object(map) = &mut value {
        map.insert("id".into(), Value::String(id.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Decodes a remote collection value into entities.
///
/// Remote collections are objects keyed by entity ID. Children that fail to
/// decode are returned separately so callers can log and skip them.
#[must_use]
pub fn decode_collection<E: Entity>(path: &str, value: Value) -> (Vec<E>, Vec<ModelError>) {
    let mut entities = Vec::new();
    let mut errors = Vec::new();

    match value {
        Value::Object(children) => {
            for (id, child) in children {
                let key = format!("{path}/{id}");
                match decode_value::<E>(&key, child) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => errors.push(e),
                }
            }
        }
        Value::Null => {}
        other => errors.push(ModelError::invalid_record(
            path,
            format!("expected an object of records, found {other}"),
        )),
    }

    (entities, errors)
}

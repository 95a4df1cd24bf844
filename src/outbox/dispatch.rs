// src/outbox/dispatch.rs
//! Per-op dispatch: text selection, embedding, and the index call for a
//! single outbox job. Kept free of polling/retry concerns so it can be unit
//! tested directly against fakes (spec.md §8 concrete scenarios 1-3, 7).

use super::Op;
use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, CoreResult};
use crate::index::{Payload, SearchIndex};
use serde_json::Value;
use tracing::{debug, warn};

/// Recognized outbox payload keys that get renamed into the internal,
/// snake_case `Payload` contract `SearchIndex` implementations expect. Every
/// other key is forwarded to the index payload unchanged (spec.md §6: "all
/// other fields are forwarded to the index payload verbatim").
const ENTRY_KEY_MAP: &[(&str, &str)] = &[
    ("actorId", "actor_id"),
    ("memoryId", "memory_id"),
    ("vaultId", "vault_id"),
    ("summary", "summary"),
    ("rawEntry", "raw_entry"),
    ("creationTime", "creation_time"),
    ("conversationTime", "conversation_time"),
    ("tags", "tags"),
];

const CONTEXT_KEY_MAP: &[(&str, &str)] = &[
    ("actorId", "actor_id"),
    ("memoryId", "memory_id"),
    ("vaultId", "vault_id"),
    ("content", "content"),
    ("context", "content"),
    ("timestamp", "timestamp"),
];

/// Returns the first value in `keys` that exists in `payload`, is a string,
/// and is non-empty after trimming. This is the text-selection rule from
/// spec.md §4.3: if nothing matches, upsert dispatch is a no-op success.
fn preferred_text(payload: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(text) = payload.get(*key).and_then(Value::as_str) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Renames recognized keys per `key_map`, forwarding everything else
/// unchanged.
fn build_payload(raw: &Value, key_map: &[(&str, &str)]) -> Payload {
    let mut out = Payload::new();
    let Some(object) = raw.as_object() else {
        return out;
    };

    let recognized: std::collections::HashSet<&str> =
        key_map.iter().map(|(from, _)| *from).collect();

    for (from, to) in key_map {
        if let Some(value) = object.get(*from) {
            out.insert(to.to_string(), value.clone());
        }
    }

    for (key, value) in object {
        if !recognized.contains(key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }

    out
}

fn required_str<'a>(payload: &'a Value, key: &str) -> CoreResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::permanent(format!("outbox payload missing required field {key}")))
}

/// Dispatches a single claimed job. Returns `Ok(())` on success (including
/// no-op-success and already-exists-as-success), `Err(CoreError::Transient)`
/// for retryable failures, and `Err(CoreError::Permanent)` for unknown ops
/// or failures that should dead-letter without further retry.
pub async fn dispatch(
    op: Op,
    id: &str,
    payload: &Value,
    embeddings: &dyn EmbeddingProvider,
    index: &dyn SearchIndex,
) -> CoreResult<()> {
    match op {
        Op::UpsertEntry => {
            let Some(text) = preferred_text(payload, &["summary", "rawEntry"]) else {
                debug!("outbox job {} has no non-empty preferred text, no-op success", id);
                return Ok(());
            };

            let vector = embed_or_retry(embeddings, &text).await?;
            let index_payload = build_payload(payload, ENTRY_KEY_MAP);

            match index.upsert_entry(id, &vector, index_payload).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Op::UpsertContext => {
            let Some(text) = preferred_text(payload, &["content", "context"]) else {
                debug!("outbox job {} has no non-empty preferred text, no-op success", id);
                return Ok(());
            };

            let vector = embed_or_retry(embeddings, &text).await?;
            let index_payload = build_payload(payload, CONTEXT_KEY_MAP);

            match index.upsert_context(id, &vector, index_payload).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Op::DeleteEntry => {
            let actor_id = required_str(payload, "actorId")?;
            match index.delete_entry(actor_id, id).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Op::DeleteContext => {
            let actor_id = required_str(payload, "actorId")?;
            match index.delete_context(actor_id, id).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Op::DeleteMemory => {
            let actor_id = required_str(payload, "actorId")?;
            let memory_id = required_str(payload, "memoryId")?;
            match index.delete_memory(actor_id, memory_id).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Op::DeleteVault => {
            let actor_id = required_str(payload, "actorId")?;
            let vault_id = required_str(payload, "vaultId")?;
            match index.delete_vault(actor_id, vault_id).await {
                Ok(()) => Ok(()),
                Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
                Err(e) => Err(e),
            }
        }
    }
}

async fn embed_or_retry(embeddings: &dyn EmbeddingProvider, text: &str) -> CoreResult<Vec<f32>> {
    embeddings.embed(text).await.map_err(|e| {
        warn!("embedding failed, will retry: {}", e);
        e
    })
}

/// Permanent-failure path for an `op` string that didn't parse into a known
/// `Op` (spec.md §4.3: "Any other op is a permanent failure").
pub fn unknown_op_error(op_raw: &str) -> CoreError {
    CoreError::permanent(format!("unknown op: {op_raw}"))
}

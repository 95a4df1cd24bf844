// src/model/mod.rs
//! Core entities shared across the outbox worker and the search service.
//!
//! Entries and context shards are owned by the primary store; everything
//! here is the shape the search/indexing core reads and writes, not a
//! reflection of the primary store's full schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An atomic conversation message, as carried through an outbox payload into
/// the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub entry_id: String,
    pub actor_id: String,
    pub vault_id: String,
    pub memory_id: String,
    pub raw_entry: String,
    pub summary: String,
    pub creation_time: DateTime<Utc>,
    pub conversation_time: Option<DateTime<Utc>>,
    pub tags: Option<HashMap<String, String>>,
}

/// A periodic narrative snapshot of a memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextShard {
    pub context_id: String,
    pub actor_id: String,
    pub vault_id: String,
    pub memory_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A ranked entry returned from `SearchIndex::search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub entry_id: String,
    pub summary: String,
    pub raw_entry: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub creation_time: DateTime<Utc>,
    pub conversation_time: Option<DateTime<Utc>>,
    pub score: f32,
}

/// A ranked context shard returned from `SearchIndex::search_contexts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextHit {
    pub context_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub score: f32,
}

/// Scope key every index operation is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryScope {
    pub actor_id: String,
    pub memory_id: String,
}

impl MemoryScope {
    pub fn new(actor_id: impl Into<String>, memory_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            memory_id: memory_id.into(),
        }
    }
}

// src/search/response.rs
// Response DTO assembled by SearchService (spec.md §4.4 step 6).

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResult {
    pub entry_id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<std::collections::HashMap<String, String>>,
    pub creation_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_time: Option<DateTime<Utc>>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextResult {
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub score: f32,
}

/// `latestContext`/`latestContextTimestamp` are always present (possibly
/// `null`); `contexts` is always present, possibly empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub entries: Vec<EntryResult>,
    pub count: usize,
    pub latest_context: Option<String>,
    pub latest_context_timestamp: Option<DateTime<Utc>>,
    pub contexts: Vec<ContextResult>,
}

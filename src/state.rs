// src/state.rs
// Shared application state, a much narrower composition than the teacher's
// `state::AppState` (which wires dozens of subsystems) since this core only
// needs the search path and the outbox's dependency checks.

use crate::embedding::EmbeddingProvider;
use crate::index::SearchIndex;
use crate::outbox::OutboxRepository;
use crate::search::SearchService;
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub search_service: Arc<SearchService>,
    pub outbox_repository: Arc<dyn OutboxRepository>,
    pub index: Arc<dyn SearchIndex>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub db_pool: PgPool,
}

impl AppState {
    pub fn new(
        search_service: Arc<SearchService>,
        outbox_repository: Arc<dyn OutboxRepository>,
        index: Arc<dyn SearchIndex>,
        embeddings: Arc<dyn EmbeddingProvider>,
        db_pool: PgPool,
    ) -> Self {
        Self {
            search_service,
            outbox_repository,
            index,
            embeddings,
            db_pool,
        }
    }
}

// src/config/mod.rs
// Central configuration for the search/indexing core, composed of per-domain
// sub-structs the way `config::MiraConfig` composes `memory::MemoryConfig` etc.

mod helpers;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    /// Process-wide configuration, read once at startup. Never re-read
    /// per-request.
    pub static ref CONFIG: CoreConfig = CoreConfig::from_env();
}

/// Hybrid ranking + SearchService request bounds. `alpha` is deployment-wide
/// per spec.md §4.4 — it is never accepted as a request parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight on the dense (cosine) component of hybrid ranking, `1.0` pure
    /// semantic, `0.0` pure lexical. Validated into `[0,1]` at construction.
    pub alpha: f32,
    pub default_top_ke: u32,
    pub min_top_ke: u32,
    pub max_top_ke: u32,
    pub default_top_kc: u32,
    pub min_top_kc: u32,
    pub max_top_kc: u32,
}

impl SearchConfig {
    pub fn from_env() -> Self {
        Self {
            alpha: helpers::env_parsed_or("SEARCH_ALPHA", 0.5),
            default_top_ke: helpers::env_parsed_or("SEARCH_DEFAULT_TOP_KE", 5),
            min_top_ke: helpers::env_parsed_or("SEARCH_MIN_TOP_KE", 0),
            max_top_ke: helpers::env_parsed_or("SEARCH_MAX_TOP_KE", 25),
            default_top_kc: helpers::env_parsed_or("SEARCH_DEFAULT_TOP_KC", 2),
            min_top_kc: helpers::env_parsed_or("SEARCH_MIN_TOP_KC", 1),
            max_top_kc: helpers::env_parsed_or("SEARCH_MAX_TOP_KC", 10),
        }
    }

    /// Validates `alpha` lies in `[0,1]`. Called once at service construction.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            anyhow::bail!("SEARCH_ALPHA must be in [0,1], got {}", self.alpha);
        }
        Ok(())
    }
}

/// Outbox polling/retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: helpers::env_parsed_or("OUTBOX_BATCH_SIZE", 50),
            poll_interval: Duration::from_millis(helpers::env_parsed_or(
                "OUTBOX_POLL_INTERVAL_MS",
                500,
            )),
            max_attempts: helpers::env_parsed_or("OUTBOX_MAX_ATTEMPTS", 8),
            backoff_base: Duration::from_millis(helpers::env_parsed_or(
                "OUTBOX_BACKOFF_BASE_MS",
                200,
            )),
            backoff_ceiling: Duration::from_secs(helpers::env_parsed_or(
                "OUTBOX_BACKOFF_CEILING_SECS",
                300,
            )),
        }
    }
}

/// Vector index connection and expected embedding dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub qdrant_url: String,
    pub collection_prefix: String,
    pub embed_dim: u64,
}

impl IndexConfig {
    pub fn from_env() -> Self {
        Self {
            qdrant_url: helpers::env_or("QDRANT_URL", "http://localhost:6334"),
            collection_prefix: helpers::env_or("QDRANT_COLLECTION_PREFIX", "mycelian"),
            embed_dim: helpers::env_parsed_or("EMBED_DIM", 768),
        }
    }
}

/// Embedding provider HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_batch_size: usize,
    pub request_timeout: Duration,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: helpers::env_or(
                "EMBEDDING_ENDPOINT",
                "https://api.openai.com/v1/embeddings",
            ),
            api_key: helpers::env_or("EMBEDDING_API_KEY", ""),
            model: helpers::env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            max_batch_size: helpers::env_parsed_or("EMBEDDING_MAX_BATCH_SIZE", 100),
            request_timeout: Duration::from_secs(helpers::env_parsed_or(
                "EMBEDDING_TIMEOUT_SECS",
                30,
            )),
        }
    }
}

/// HTTP server + primary store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: helpers::env_or("HOST", "0.0.0.0"),
            port: helpers::env_parsed_or("PORT", 8080),
            database_url: helpers::env_or(
                "DATABASE_URL",
                "postgres://localhost/mycelian_memory",
            ),
            max_connections: helpers::env_parsed_or("DATABASE_MAX_CONNECTIONS", 10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub search: SearchConfig,
    pub outbox: OutboxConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            search: SearchConfig::from_env(),
            outbox: OutboxConfig::from_env(),
            index: IndexConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            server: ServerConfig::from_env(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.search.validate()
    }
}

// src/main.rs
// Mycelian Memory - search/indexing core server

use anyhow::Result;
use clap::Parser;
use mycelian_memory_core::api;
use mycelian_memory_core::api::auth::StaticTokenAuthenticator;
use mycelian_memory_core::config::CONFIG;
use mycelian_memory_core::embedding::HttpEmbeddingProvider;
use mycelian_memory_core::index::QdrantIndex;
use mycelian_memory_core::outbox::{OutboxWorker, PostgresOutboxRepository};
use mycelian_memory_core::search::SearchService;
use mycelian_memory_core::state::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Command-line overrides for the search/indexing core server. Every flag
/// also reads from its environment variable, so a plain `CONFIG.from_env()`
/// deployment (no flags passed) behaves identically to before this CLI
/// existed.
#[derive(Parser, Debug)]
#[command(name = "mycelian-memory-server")]
#[command(about = "Mycelian Memory search/indexing core", long_about = None)]
struct CliArgs {
    /// Address to bind the HTTP server to, overriding HOST.
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to bind the HTTP server to, overriding PORT.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log level for the stderr tracing subscriber.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    CONFIG.validate()?;
    info!("Starting Mycelian Memory search/indexing core...");

    let db_pool = PgPoolOptions::new()
        .max_connections(CONFIG.server.max_connections)
        .connect(&CONFIG.server.database_url)
        .await?;
    info!("Connected to primary store");

    let outbox_repository = Arc::new(PostgresOutboxRepository::new(db_pool.clone()));
    outbox_repository.ensure_schema().await?;

    let embeddings: Arc<dyn mycelian_memory_core::embedding::EmbeddingProvider> = Arc::new(
        HttpEmbeddingProvider::new(CONFIG.embedding.clone(), CONFIG.index.embed_dim)?,
    );

    let index: Arc<dyn mycelian_memory_core::index::SearchIndex> =
        Arc::new(QdrantIndex::new(&CONFIG.index).await?);
    info!("Connected to search index");

    let authenticator = Arc::new(StaticTokenAuthenticator);
    let search_service = Arc::new(SearchService::new(
        embeddings.clone(),
        index.clone(),
        authenticator,
        CONFIG.search.clone(),
    )?);

    let worker = Arc::new(OutboxWorker::new(
        outbox_repository.clone(),
        embeddings.clone(),
        index.clone(),
        CONFIG.outbox.clone(),
    ));
    let worker_handle = worker.clone().spawn();

    let state = Arc::new(AppState::new(
        search_service,
        outbox_repository,
        index,
        embeddings,
        db_pool,
    ));

    let app = api::router(state);
    let host = args.host.unwrap_or_else(|| CONFIG.server.host.clone());
    let port = args.port.unwrap_or(CONFIG.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let result = serve.await;

    worker.request_stop();
    let _ = worker_handle.await;

    result?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

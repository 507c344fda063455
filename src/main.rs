use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simplechat::{api, config::ChatConfig, state::AppState, store::snapshot, store::MemoryStore};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simplechat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Simple Chat...");

    let config = ChatConfig::from_env();
    tracing::info!(
        "History cap {}, tables: {} / {} / {}",
        config.history_cap,
        config.connection_table,
        config.message_table,
        config.counter_table
    );

    let state = Arc::new(AppState::with_store(MemoryStore::new(), &config));
    if let Some(path) = &config.snapshot_path {
        match state.restore_from(path).await {
            Ok(true) => tracing::info!("Restored store from {}", path.display()),
            Ok(false) => tracing::info!("No snapshot at {}, starting empty", path.display()),
            Err(e) => tracing::warn!("Ignoring unreadable snapshot {}: {}", path.display(), e),
        }
        snapshot::spawn_snapshot_saver(
            state.store.clone(),
            path.clone(),
            config.snapshot_interval,
        );
    }

    let app = api::router(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

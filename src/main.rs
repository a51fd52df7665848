use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use integrations_auth::config::{Config, TransientBackend};
use integrations_auth::providers::{self, ProviderRegistry};
use integrations_auth::store::{self, KeyValueStore, MemoryStore, SqliteKvStore, TokenStore};
use integrations_auth::{api, http_client, AppState, Gateway, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "integrations_auth=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("integrations-auth v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    // Initialize components
    let tokens = TokenStore::connect(&config.database_url).await?;
    tokens.migrate().await?;
    info!("Token database ready ✓");

    let transient: Arc<dyn KeyValueStore> = match config.transient_backend {
        TransientBackend::Memory => Arc::new(MemoryStore::new()),
        TransientBackend::Sqlite => Arc::new(SqliteKvStore::new(tokens.pool().clone())),
    };
    store::spawn_sweeper(transient.clone(), Duration::from_secs(60));

    let http = http_client(&config)?;
    let mut registry = ProviderRegistry::new();
    providers::register_defaults(&mut registry, &config, &http);
    info!("Registered {} OAuth providers: {:?}", registry.count(), registry.list());

    // Build shared state
    let gateway = Gateway::new(&registry, transient, tokens);
    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        gateway,
    });

    // Build router
    let app = api::router(state)?;

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use query_relay::chat::Orchestrator;
use query_relay::config::{Cli, Config};
use query_relay::conversation::ConversationStore;
use query_relay::llm::ModelRegistry;
use query_relay::server::api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "query_relay=debug,tower_http=debug"
    } else {
        "query_relay=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("query-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_cli(&cli);
    config.validate()?;

    info!(
        provider = %config.chat.provider,
        default_thread_id = %config.chat.default_thread_id,
        providers = config.providers.0.len(),
        "Configuration loaded"
    );

    // Build provider clients once; they are shared read-only by every request.
    let registry = Arc::new(ModelRegistry::from_config(&config.providers.0, &config.chat));
    let orchestrator = Orchestrator::new(
        registry.clone(),
        ConversationStore::new(),
        config.chat.provider.clone(),
    );

    let state = Arc::new(AppState {
        orchestrator,
        registry,
        default_thread_id: config.chat.default_thread_id.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state, config.server.max_concurrent_requests);

    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use chat_relay_server::config::Settings;
use chat_relay_server::metrics::RelayMetrics;
use chat_relay_server::services::{ChatRelay, HistoryStore, LlmService, TokenCache};
use chat_relay_server::telemetry::init_telemetry;
use chat_relay_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = init_telemetry(&settings.logging);

    info!("🚀 Starting chat relay server...");
    info!(
        model = %settings.llm.model,
        max_exchanges = settings.history.max_exchanges,
        cache = ?settings.cache.backend,
        "✅ Configuration loaded"
    );

    // Initialize services
    let history = Arc::new(HistoryStore::new(settings.history.max_exchanges));
    let token_cache = TokenCache::connect(&settings.cache).await;
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);

    let relay = Arc::new(ChatRelay::new(
        history,
        token_cache,
        llm_service,
        settings.llm.max_tokens,
    ));
    let metrics = Arc::new(RelayMetrics::new()?);

    // Build router
    let app = build_router(AppState::new(relay, metrics));

    // Server address
    let addr: SocketAddr = settings.listen_addr().parse()?;
    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

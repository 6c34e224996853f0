mod config;
mod model;
mod stream;
mod yahoo;

use crate::{config::ServerConfig, model::HttpModel, stream::AppState, yahoo::YahooClient};
use std::sync::Arc;
use tickwise::{
    EngineConfig, SignalEngine,
    cache::{ContextRefresher, ContextStore, RefreshConfig},
    candle::HistoryProvider,
    context::ContextProvider,
    ml::SmoothedPredictor,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Starting tickwise signal server");

    // Configurable via TICKWISE_* env vars
    let config = ServerConfig::from_env();
    info!(?config, "loaded server config");

    let yahoo = match YahooClient::new(config.upstream_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };

    // Background context refresh, independent of subscribers
    let store = Arc::new(ContextStore::default());
    let refresher = ContextRefresher::new(
        Arc::clone(&yahoo) as Arc<dyn ContextProvider>,
        Arc::clone(&store),
        RefreshConfig::default()
            .with_period(config.refresh_period)
            .with_upstream_timeout(config.upstream_timeout),
    )
    .spawn();

    let engine = SignalEngine::new(
        Arc::clone(&yahoo) as Arc<dyn HistoryProvider>,
        Arc::clone(&yahoo) as Arc<dyn ContextProvider>,
        store,
        EngineConfig::default().with_upstream_timeout(config.upstream_timeout),
    );
    let engine = match &config.ml_url {
        Some(url) => match HttpModel::new(url.clone(), config.upstream_timeout) {
            Ok(model) => {
                info!(%url, "ML predictions enabled");
                engine.with_predictor(Arc::new(SmoothedPredictor::new(model)))
            }
            Err(e) => {
                warn!("ML client unavailable, predictions disabled: {}", e);
                engine
            }
        },
        None => {
            info!("TICKWISE_ML_URL not set, predictions disabled");
            engine
        }
    };

    let listener = match TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind WebSocket server on {}: {}", config.addr, e);
            refresher.shutdown().await;
            return;
        }
    };
    info!("WebSocket server listening on ws://{}/ws?symbol=NIFTY&interval=5", config.addr);

    let state = Arc::new(AppState {
        engine,
        prices: YahooClient::clone(&yahoo),
        config,
    });

    tokio::select! {
        _ = stream::serve(listener, state) => {
            warn!("WebSocket listener stopped");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    refresher.shutdown().await;
    info!("tickwise signal server stopped");
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

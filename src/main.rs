mod api;
mod config;
mod error;
mod hub;
mod models;
mod services;
mod websocket;

use std::time::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::interval;
use log::{info, error};
use tower_http::cors::CorsLayer;

use crate::config::{Config, PriceSourceKind, STATS_INTERVAL_SECS};
use crate::hub::{BroadcastHub, Collaborators, HubOptions};
use crate::services::{EastmoneyPriceSource, MemoryStore, PortfolioService, PriceSource, SimulatedPriceSource};
use crate::api::{ApiState, create_api_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger first so configuration warnings are visible
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = Config::from_env();

    // Log configuration
    config.log_config();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let store = Arc::new(MemoryStore::new());

    let prices: Arc<dyn PriceSource> = match config.price_source_kind()? {
        PriceSourceKind::Eastmoney => Arc::new(EastmoneyPriceSource::new(config.quote_timeout())?),
        PriceSourceKind::Simulated => {
            info!("Using simulated prices");
            Arc::new(SimulatedPriceSource::new())
        }
    };

    let collaborators = Collaborators {
        prices,
        positions: store.clone(),
        portfolio: Arc::new(PortfolioService::new(store.clone())),
        history: store.clone(),
    };

    let options = HubOptions {
        refresh_interval: config.refresh_interval(),
        queue_capacity: config.queue_capacity,
        overflow_policy: config.overflow_policy()?,
        send_timeout: config.send_timeout(),
    };
    let hub = Arc::new(BroadcastHub::new(collaborators, options)?);

    if config.auto_start {
        hub.start().await;
    } else {
        info!("📊 Broadcast hub ready - use POST /api/start to begin streaming");
    }

    start_stats_task(hub.clone());

    // Start API server
    let api_state = ApiState {
        hub: hub.clone(),
        store: store.clone(),
    };

    let api_router = create_api_router(api_state)
        .layer(CorsLayer::permissive()); // Enable CORS for web clients

    let api_bind_address = config.api_bind_address.clone();
    let api_listener = TcpListener::bind(&api_bind_address).await?;
    info!("🌐 HTTP API server running at http://{}", api_bind_address);

    let api_server = axum::serve(api_listener, api_router);

    // Start WebSocket server
    let ws_bind_address = config.bind_address.clone();
    let ws_listener = TcpListener::bind(&ws_bind_address).await?;
    info!("🚀 WebSocket server running at ws://{}/ws", ws_bind_address);

    let websocket_server = websocket::serve(ws_listener, hub.clone());

    // Run both servers concurrently
    info!("🎯 Starting WebSocket and HTTP API servers...");
    tokio::select! {
        result = api_server => {
            error!("API server stopped: {:?}", result);
        }
        _ = websocket_server => {
            error!("WebSocket server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    hub.stop().await;

    Ok(())
}

fn start_stats_task(hub: Arc<BroadcastHub>) {
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            interval_timer.tick().await;
            let stats = hub.stats();

            if stats.subscribers > 0 || stats.queued > 0 || stats.dropped > 0 {
                info!("Stats - State: {:?}, Subscribers: {}, Queued: {}/{}, Dropped: {}",
                      stats.state, stats.subscribers, stats.queued, stats.queue_capacity, stats.dropped);
            }
        }
    });

    info!("📈 Started stats monitoring task (every {} seconds)", STATS_INTERVAL_SECS);
}

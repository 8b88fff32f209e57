use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod crypto;
mod db;
mod error;
mod models;
mod services;

use config::Config;
use db::Database;
use services::{
    ClaimProcessor, EvmGameChain, LeaderboardCache, MissionLedger, RedisNonceRegistry,
    TransactionRelay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cyberrng_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting CyberRNG relay");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("Chain id: {}", config.chain_id);
    if config.is_testnet() {
        tracing::warn!("Relaying against a test network");
    }

    // Initialize database
    let db = Database::new(&config).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let redis_manager = redis::aio::ConnectionManager::new(redis).await?;

    // Chain + relayer
    let chain = Arc::new(EvmGameChain::from_config(&config)?);
    let relay = Arc::new(TransactionRelay::from_config(&config, chain.clone()));

    let store = Arc::new(db.clone());
    let ledger = Arc::new(MissionLedger::new(store.clone()));
    let claims = Arc::new(ClaimProcessor::new(ledger.clone(), relay.clone()));
    let leaderboard = Arc::new(LeaderboardCache::new(store));

    let app_state = api::AppState {
        db: db.clone(),
        redis: redis_manager.clone(),
        chain,
        relay,
        ledger,
        claims: claims.clone(),
        leaderboard,
        nonces: Arc::new(RedisNonceRegistry::new(redis_manager)),
        config: config.clone(),
    };

    // Build router
    let app = build_router(app_state);

    // Start background services
    services::start_background_services(claims, &config).await;

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Relayed game actions
        .route("/mine", post(api::actions::mine))
        .route("/workshop/enchant", post(api::actions::enchant))
        .route("/salvage", post(api::actions::salvage))
        .route("/equip", post(api::actions::equip))
        .route("/shop/software", post(api::actions::buy_software))
        .route("/use", post(api::actions::use_item))
        // Rig staking
        .route("/rig/stake", post(api::rig::stake))
        .route("/rig/unstake", post(api::rig::unstake))
        .route("/rig/claim", post(api::rig::claim_yield))
        // Daily missions
        .route("/contracts/claim", post(api::contracts::claim_mission))
        .route("/contracts/{address}", get(api::contracts::list_missions))
        // Read views
        .route("/profile/{address}", get(api::profile::get_profile))
        .route("/inventory/{address}", get(api::profile::get_inventory))
        .route("/leaderboard", get(api::leaderboard::get_leaderboard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Explicit origin list, or `None` when any origin is allowed.
fn allowed_origins(raw: &str) -> Option<Vec<HeaderValue>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return None;
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return None;
    }
    Some(allowed)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let Some(allowed) = allowed_origins(&config.cors_allowed_origins) else {
        return CorsLayer::very_permissive();
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

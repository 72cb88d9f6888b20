mod auth;
mod config;
mod handler;
mod pipeline;
mod service;
mod state;
#[cfg(test)]
mod test_support;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use config::ApiConfig;
use connectors::{
    coingecko::{CoinGeckoConnector, GatewayConfig},
    RateLimiter,
};
use service::CryptoService;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use store::{MemoryUserStore, StoreConfig};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::JwtAuthenticator;

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handler::health))
        .route("/crypto/top", get(handler::top_coins))
        .route("/crypto/trending", get(handler::trending))
        .route("/crypto/watchlist", get(handler::get_watchlist))
        .route("/crypto/watchlist/add", post(handler::add_to_watchlist))
        .route(
            "/crypto/watchlist/remove/:coin_id",
            delete(handler::remove_from_watchlist),
        )
        .route("/crypto/:id", get(handler::coin_detail))
        .route("/crypto/:id/history", get(handler::price_history))
        .route("/portfolio", get(handler::get_portfolio))
        .route("/portfolio/stats", get(handler::portfolio_stats))
        .route("/portfolio/add", post(handler::add_to_portfolio))
        .route(
            "/portfolio/update/:index",
            put(handler::update_portfolio_entry),
        )
        .route(
            "/portfolio/remove/:index",
            delete(handler::remove_from_portfolio),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting CoinSight API");

    let config = ApiConfig::from_env()?;

    let store_config = StoreConfig::from_env()
        .map_err(|e| format!("Failed to load store configuration: {}", e))?;
    let user_store = MemoryUserStore::load(store_config)
        .await
        .map_err(|e| format!("Failed to load user store: {}", e))?;

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let gateway = CoinGeckoConnector::new(GatewayConfig::from_env(), limiter)?;
    info!(
        "CoinGecko gateway admits {} calls per {}s",
        config.rate_limit.max_calls,
        config.rate_limit.window.as_secs()
    );

    let service = CryptoService::new(
        Arc::new(gateway),
        Arc::new(user_store),
        config.service_settings(),
    );

    let app = build_router(AppState {
        service: Arc::new(service),
        auth: Arc::new(JwtAuthenticator::new(&config.jwt_secret)),
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

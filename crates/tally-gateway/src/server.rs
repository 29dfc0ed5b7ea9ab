// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tally_billing::{AccountLedger, BillingGate, DepositProcessor, UsageLog};
use tally_config::model::BillingConfig;
use tally_core::{TallyError, TierConfig};
use tower_http::cors::CorsLayer;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub ledger: AccountLedger,
    pub deposits: DepositProcessor,
    pub gate: BillingGate,
    pub usage: UsageLog,
    /// Billing settings surfaced by the pricing endpoint.
    pub billing: BillingConfig,
    /// Tier table surfaced by the pricing endpoint.
    pub tiers: Vec<TierConfig>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Gateway server configuration (mirrors GatewayConfig from tally-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public route for process supervisors.
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/pricing", get(handlers::get_pricing))
        .route("/v1/deposits", post(handlers::post_deposits))
        .route("/v1/accounts/{id}/balance", get(handlers::get_balance))
        .route(
            "/v1/accounts/{id}/usage",
            get(handlers::get_usage).post(handlers::post_usage),
        )
        .route("/v1/accounts/{id}/gate", post(handlers::post_gate))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP server.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), TallyError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TallyError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| TallyError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally serve` command implementation.
//!
//! Wires the SQLite store, HTTP adapters, billing components, and the
//! gateway together, then runs until interrupted. A background loop
//! retries pending deposits with a doubling backoff so a price feed
//! outage only defers crediting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_adapters::{HttpHoldingsAdapter, HttpPricingAdapter};
use tally_billing::{
    AccountLedger, BillingGate, DepositProcessor, QuotaEnforcer, TierResolver, UsageLog,
};
use tally_config::model::TallyConfig;
use tally_core::{HoldingsAdapter, PricingAdapter, TallyError};
use tally_gateway::{AuthConfig, GatewayState, ServerConfig};
use tally_storage::Database;
use tracing::{info, warn};

/// Initial delay before pending deposits are re-attempted.
const DEPOSIT_RETRY_BASE: Duration = Duration::from_secs(60);
/// Ceiling for the retry delay during a long feed outage.
const DEPOSIT_RETRY_MAX: Duration = Duration::from_secs(900);

/// Next retry delay: doubles while nothing gets credited, capped at
/// [`DEPOSIT_RETRY_MAX`], and snaps back to the base once a retry
/// succeeds.
fn next_retry_delay(current: Duration, credited: bool) -> Duration {
    if credited {
        DEPOSIT_RETRY_BASE
    } else {
        (current * 2).min(DEPOSIT_RETRY_MAX)
    }
}

/// Pricing adapter used when no feed URL is configured. Every lookup
/// fails, so non-stable deposits stay pending.
struct OfflinePricing;

#[async_trait]
impl PricingAdapter for OfflinePricing {
    async fn usd_price(&self, token: &str) -> Result<f64, TallyError> {
        Err(TallyError::Adapter {
            message: format!("no pricing endpoint configured (token {token})"),
            source: None,
        })
    }
}

/// Holdings adapter used when no lookup URL is configured. Every lookup
/// fails, so accounts keep their cached tier.
struct OfflineHoldings;

#[async_trait]
impl HoldingsAdapter for OfflineHoldings {
    async fn token_balance(&self, _wallet: &str) -> Result<f64, TallyError> {
        Err(TallyError::Adapter {
            message: "no holdings endpoint configured".to_string(),
            source: None,
        })
    }
}

fn build_pricing(config: &TallyConfig) -> Result<Arc<dyn PricingAdapter>, TallyError> {
    match &config.adapters.pricing_url {
        Some(url) => Ok(Arc::new(HttpPricingAdapter::new(url.clone())?)),
        None => {
            warn!("no pricing endpoint configured; non-stable deposits will stay pending");
            Ok(Arc::new(OfflinePricing))
        }
    }
}

fn build_holdings(config: &TallyConfig) -> Result<Arc<dyn HoldingsAdapter>, TallyError> {
    match &config.adapters.holdings_url {
        Some(url) => Ok(Arc::new(HttpHoldingsAdapter::new(url.clone())?)),
        None => {
            warn!("no holdings endpoint configured; accounts keep their cached tier");
            Ok(Arc::new(OfflineHoldings))
        }
    }
}

/// Run the `tally serve` command.
pub async fn run_serve(config: TallyConfig) -> Result<(), TallyError> {
    init_tracing(&config.service.log_level);
    info!(service = %config.service.name, "starting tally");

    let db = Database::open(&config.storage.database_path).await?;
    info!(path = %config.storage.database_path, "database ready");

    let pricing = build_pricing(&config)?;
    let holdings = build_holdings(&config)?;

    let billing = config.billing.clone();
    let tiers = config.tiers.clone();

    let ledger = AccountLedger::new(db.clone(), billing.clone());
    let deposits = DepositProcessor::new(db.clone(), pricing.clone(), billing.clone(), tiers.clone());
    let resolver = TierResolver::new(
        db.clone(),
        holdings,
        pricing,
        billing.clone(),
        tiers.clone(),
    );
    let quota = QuotaEnforcer::new(db.clone(), billing.clone());
    let usage = UsageLog::new(db.clone());
    let gate = BillingGate::new(resolver, quota, usage.clone());

    // Background retry loop for deposits deferred by a feed outage,
    // backing off while the outage lasts.
    let retry_deposits = deposits.clone();
    tokio::spawn(async move {
        let mut delay = DEPOSIT_RETRY_BASE;
        loop {
            tokio::time::sleep(delay).await;
            let credited = match retry_deposits.retry_pending().await {
                Ok(0) => false,
                Ok(credited) => {
                    info!(credited, "retried pending deposits");
                    true
                }
                Err(err) => {
                    warn!(error = %err, "pending deposit retry failed");
                    false
                }
            };
            delay = next_retry_delay(delay, credited);
        }
    });

    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set; all API requests will be rejected");
    }

    let state = GatewayState {
        ledger,
        deposits,
        gate,
        usage,
        billing,
        tiers,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        start_time: std::time::Instant::now(),
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    tokio::select! {
        result = tally_gateway::start_server(&server_config, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            if let Err(err) = db.close().await {
                warn!(error = %err, "database close failed during shutdown");
            }
            Ok(())
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

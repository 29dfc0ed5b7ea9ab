// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures: in-memory database and deterministic billing config.

use tally_config::model::BillingConfig;
use tally_core::TierConfig;
use tally_storage::Database;

/// Fresh in-memory database with migrations applied.
///
/// Panics on failure; tests have no meaningful recovery path.
pub async fn memory_database() -> Database {
    Database::open_in_memory()
        .await
        .expect("in-memory database should open")
}

/// Billing config with small, easy-to-assert numbers.
///
/// Grants 5 free credits on signup and keeps the production defaults
/// for everything else (reward token "TALLY", $1 per 1000 credits,
/// 24-hour window, 300-second tier cache).
pub fn test_billing_config() -> BillingConfig {
    BillingConfig {
        signup_free_credits: 5,
        pricing_timeout_ms: 250,
        holdings_timeout_ms: 250,
        ..BillingConfig::default()
    }
}

/// A single tier with the given daily limit and a high per-minute rate,
/// for quota tests that must not trip the rate limiter.
pub fn test_tier(daily_limit: u32) -> TierConfig {
    TierConfig {
        name: "test".to_string(),
        min_holding_usd: 0.0,
        daily_limit,
        rate_limit_per_minute: 1000,
        bonus_percent_for_reward_token: 0.0,
    }
}

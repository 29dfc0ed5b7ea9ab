// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally credit ledger service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use tally_core::TierConfig;

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credit pricing, deposit, and quota-window settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Ordered tier table, ascending by `min_holding_usd`.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,

    /// Gateway HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// External adapter endpoints.
    #[serde(default)]
    pub adapters: AdapterConfig,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            storage: StorageConfig::default(),
            billing: BillingConfig::default(),
            tiers: default_tiers(),
            gateway: GatewayConfig::default(),
            adapters: AdapterConfig::default(),
        }
    }
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "tally.db".to_string()
}

/// Credit pricing, deposit, and quota-window configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// USD price for 1000 credits.
    #[serde(default = "default_price_per_thousand")]
    pub price_per_thousand_credits_usd: f64,

    /// Token symbol that earns the tier's deposit bonus.
    #[serde(default = "default_reward_token")]
    pub reward_token: String,

    /// Token symbols priced 1:1 with USD (no price feed lookup).
    #[serde(default = "default_stable_tokens")]
    pub stable_tokens: Vec<String>,

    /// Deposit destination shown to users by the pricing endpoint.
    #[serde(default)]
    pub treasury_address: String,

    /// Free credits granted when an account is lazily created.
    #[serde(default = "default_signup_free_credits")]
    pub signup_free_credits: i64,

    /// Quota window length in hours.
    #[serde(default = "default_quota_window_hours")]
    pub quota_window_hours: u32,

    /// How long a resolved tier stays cached before re-checking holdings.
    /// 0 disables the cache (always re-resolve).
    #[serde(default = "default_tier_cache_ttl_secs")]
    pub tier_cache_ttl_secs: u64,

    /// Bounded timeout for price feed lookups.
    #[serde(default = "default_lookup_timeout_ms")]
    pub pricing_timeout_ms: u64,

    /// Bounded timeout for wallet holdings lookups.
    #[serde(default = "default_lookup_timeout_ms")]
    pub holdings_timeout_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            price_per_thousand_credits_usd: default_price_per_thousand(),
            reward_token: default_reward_token(),
            stable_tokens: default_stable_tokens(),
            treasury_address: String::new(),
            signup_free_credits: default_signup_free_credits(),
            quota_window_hours: default_quota_window_hours(),
            tier_cache_ttl_secs: default_tier_cache_ttl_secs(),
            pricing_timeout_ms: default_lookup_timeout_ms(),
            holdings_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

fn default_price_per_thousand() -> f64 {
    1.0
}

fn default_reward_token() -> String {
    "TALLY".to_string()
}

fn default_stable_tokens() -> Vec<String> {
    vec!["USDC".to_string(), "USDT".to_string()]
}

fn default_signup_free_credits() -> i64 {
    25
}

fn default_quota_window_hours() -> u32 {
    24
}

fn default_tier_cache_ttl_secs() -> u64 {
    300
}

fn default_lookup_timeout_ms() -> u64 {
    3000
}

/// Default tier table: free, holder, whale.
pub fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            name: "free".to_string(),
            min_holding_usd: 0.0,
            daily_limit: 25,
            rate_limit_per_minute: 6,
            bonus_percent_for_reward_token: 10.0,
        },
        TierConfig {
            name: "holder".to_string(),
            min_holding_usd: 100.0,
            daily_limit: 100,
            rate_limit_per_minute: 20,
            bonus_percent_for_reward_token: 15.0,
        },
        TierConfig {
            name: "whale".to_string(),
            min_holding_usd: 1000.0,
            daily_limit: 500,
            rate_limit_per_minute: 60,
            bonus_percent_for_reward_token: 20.0,
        },
    ]
}

/// Gateway HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for API auth. `None` rejects all authenticated routes
    /// (fail-closed).
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8090
}

/// External adapter endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Base URL of the price feed collaborator. `None` disables the HTTP
    /// pricing adapter (deposits stay pending).
    #[serde(default)]
    pub pricing_url: Option<String>,

    /// Base URL of the holdings lookup collaborator. `None` disables the
    /// HTTP holdings adapter (accounts stay at their cached tier).
    #[serde(default)]
    pub holdings_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_three_tiers() {
        let config = TallyConfig::default();
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.tiers[0].name, "free");
        assert_eq!(config.tiers[2].name, "whale");
    }

    #[test]
    fn default_tiers_ascend_by_threshold() {
        let tiers = default_tiers();
        for pair in tiers.windows(2) {
            assert!(pair[0].min_holding_usd < pair[1].min_holding_usd);
        }
    }

    #[test]
    fn billing_defaults() {
        let billing = BillingConfig::default();
        assert!((billing.price_per_thousand_credits_usd - 1.0).abs() < f64::EPSILON);
        assert_eq!(billing.quota_window_hours, 24);
        assert_eq!(billing.tier_cache_ttl_secs, 300);
        assert!(billing.stable_tokens.contains(&"USDC".to_string()));
    }
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Tally configuration system.

use tally_config::diagnostic::ConfigError;
use tally_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_tally_config() {
    let toml = r#"
[service]
name = "tally-test"
log_level = "debug"

[storage]
database_path = "/tmp/tally-test.db"

[billing]
price_per_thousand_credits_usd = 1.0
reward_token = "TALLY"
stable_tokens = ["USDC"]
treasury_address = "9xTreasury"
signup_free_credits = 5
tier_cache_ttl_secs = 60

[[tiers]]
name = "free"
min_holding_usd = 0.0
daily_limit = 25
rate_limit_per_minute = 6
bonus_percent_for_reward_token = 10.0

[[tiers]]
name = "whale"
min_holding_usd = 1000.0
daily_limit = 500
rate_limit_per_minute = 60
bonus_percent_for_reward_token = 20.0

[gateway]
host = "0.0.0.0"
port = 8090
bearer_token = "secret"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "tally-test");
    assert_eq!(config.storage.database_path, "/tmp/tally-test.db");
    assert_eq!(config.billing.treasury_address, "9xTreasury");
    assert_eq!(config.billing.signup_free_credits, 5);
    assert_eq!(config.tiers.len(), 2);
    assert_eq!(config.tiers[1].name, "whale");
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("secret"));
}

/// Unknown field in [billing] is rejected by deny_unknown_fields.
#[test]
fn unknown_field_in_billing_produces_error() {
    let toml = r#"
[billing]
reward_tokn = "TALLY"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("reward_tokn"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// load_and_validate_str surfaces both parse and validation errors as
/// ConfigError diagnostics.
#[test]
fn validation_errors_surface_as_diagnostics() {
    let toml = r#"
[billing]
price_per_thousand_credits_usd = -1.0
"#;

    let errors = load_and_validate_str(toml).expect_err("negative price should fail");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("price_per_thousand"))));
}

/// Defaults alone are a valid configuration.
#[test]
fn empty_config_validates() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.tiers[0].name, "free");
    assert_eq!(config.tiers[0].min_holding_usd, 0.0);
}

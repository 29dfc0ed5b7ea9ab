// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as ascending tier thresholds and a positive credit
//! price.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.billing.price_per_thousand_credits_usd <= 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "billing.price_per_thousand_credits_usd must be positive, got {}",
                config.billing.price_per_thousand_credits_usd
            ),
        });
    }

    if config.billing.signup_free_credits < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "billing.signup_free_credits must be non-negative, got {}",
                config.billing.signup_free_credits
            ),
        });
    }

    if config.billing.quota_window_hours == 0 {
        errors.push(ConfigError::Validation {
            message: "billing.quota_window_hours must be at least 1".to_string(),
        });
    }

    if config.tiers.is_empty() {
        errors.push(ConfigError::Validation {
            message: "at least one [[tiers]] entry is required".to_string(),
        });
    }

    // The first tier is the lazy-creation default; it must accept everyone.
    if let Some(first) = config.tiers.first() {
        if first.min_holding_usd != 0.0 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "tiers[0].min_holding_usd must be 0 (lowest tier is the default), got {}",
                    first.min_holding_usd
                ),
            });
        }
    }

    // Ascending thresholds so last-match-wins selection is well defined.
    for (i, pair) in config.tiers.windows(2).enumerate() {
        if pair[0].min_holding_usd >= pair[1].min_holding_usd {
            errors.push(ConfigError::Validation {
                message: format!(
                    "tiers[{}].min_holding_usd ({}) must be less than tiers[{}].min_holding_usd ({})",
                    i,
                    pair[0].min_holding_usd,
                    i + 1,
                    pair[1].min_holding_usd
                ),
            });
        }
    }

    let mut seen_names = HashSet::new();
    for tier in &config.tiers {
        if tier.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "tier names must not be empty".to_string(),
            });
        }
        if !seen_names.insert(&tier.name) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate tier name `{}` in [[tiers]] array", tier.name),
            });
        }
        if tier.daily_limit == 0 {
            errors.push(ConfigError::Validation {
                message: format!("tier `{}` daily_limit must be at least 1", tier.name),
            });
        }
        if tier.bonus_percent_for_reward_token < 0.0 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "tier `{}` bonus_percent_for_reward_token must be non-negative",
                    tier.name
                ),
            });
        }
    }

    // Validate gateway host looks like a valid IP or hostname.
    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = TallyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TallyConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn zero_price_fails_validation() {
        let mut config = TallyConfig::default();
        config.billing.price_per_thousand_credits_usd = 0.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("price_per_thousand"))));
    }

    #[test]
    fn unsorted_tiers_fail_validation() {
        let mut config = TallyConfig::default();
        config.tiers.swap(1, 2);
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("min_holding_usd"))));
    }

    #[test]
    fn nonzero_first_tier_fails_validation() {
        let mut config = TallyConfig::default();
        config.tiers[0].min_holding_usd = 5.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("tiers[0]"))));
    }

    #[test]
    fn duplicate_tier_names_fail_validation() {
        let mut config = TallyConfig::default();
        config.tiers[1].name = "free".to_string();
        // Keep thresholds ascending so only the duplicate name trips.
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("duplicate tier name"))));
    }

    #[test]
    fn empty_tier_table_fails_validation() {
        let mut config = TallyConfig::default();
        config.tiers.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("[[tiers]]"))));
    }
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier resolution from reward-token holdings.
//!
//! An account's tier is derived from the USD value of its reward-token
//! holdings at resolution time. Lookups hit external adapters (holdings
//! balance, token price), so the result is cached on the account row
//! with a TTL; within the TTL the gate never leaves the process. When a
//! lookup fails the account keeps its cached tier rather than being
//! dropped to the bottom one, so an adapter outage never degrades
//! paying users.

use chrono::{DateTime, Utc};
use rusqlite::params;
use std::sync::Arc;
use tally_config::model::BillingConfig;
use tally_core::{AccountId, HoldingsAdapter, PricingAdapter, TallyError, TierConfig};
use tally_storage::{map_tr_err, Database};
use tracing::{debug, warn};

use crate::ledger::{ensure_account, read_account};
use crate::{parse_iso, to_iso};

/// Select the tier for a holdings value.
///
/// `tiers` is ordered by ascending `min_holding_usd`; the last tier whose
/// threshold is met wins. Validation guarantees the first tier's
/// threshold is zero, so a non-empty list always matches.
pub fn select_tier(tiers: &[TierConfig], holding_usd: f64) -> Option<&TierConfig> {
    tiers
        .iter()
        .rev()
        .find(|t| holding_usd >= t.min_holding_usd)
        .or(tiers.first())
}

/// Look up a tier by name, falling back to the lowest tier for names no
/// longer present in configuration.
pub fn tier_by_name<'a>(tiers: &'a [TierConfig], name: &str) -> Option<&'a TierConfig> {
    tiers.iter().find(|t| t.name == name).or(tiers.first())
}

/// Resolves and caches the tier for an account.
#[derive(Clone)]
pub struct TierResolver {
    db: Database,
    holdings: Arc<dyn HoldingsAdapter>,
    pricing: Arc<dyn PricingAdapter>,
    config: BillingConfig,
    tiers: Vec<TierConfig>,
}

impl TierResolver {
    pub fn new(
        db: Database,
        holdings: Arc<dyn HoldingsAdapter>,
        pricing: Arc<dyn PricingAdapter>,
        config: BillingConfig,
        tiers: Vec<TierConfig>,
    ) -> Self {
        Self {
            db,
            holdings,
            pricing,
            config,
            tiers,
        }
    }

    /// The account's current tier, from cache when fresh.
    pub async fn resolve(&self, account_id: &AccountId) -> Result<TierConfig, TallyError> {
        self.resolve_at(account_id, Utc::now()).await
    }

    /// Clock-injected variant of [`Self::resolve`].
    pub async fn resolve_at(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<TierConfig, TallyError> {
        let row = self.load_account(account_id, now).await?;

        let fresh = row
            .last_tier_check
            .as_deref()
            .and_then(parse_iso)
            .map(|checked| (now - checked).num_seconds() < self.config.tier_cache_ttl_secs as i64)
            .unwrap_or(false);

        if fresh {
            if let Some(tier) = tier_by_name(&self.tiers, &row.cached_tier) {
                return Ok(tier.clone());
            }
        }

        match self.holdings_usd(account_id).await {
            Ok(holding_usd) => {
                let tier = select_tier(&self.tiers, holding_usd)
                    .cloned()
                    .ok_or_else(|| TallyError::Config("tier list is empty".to_string()))?;
                debug!(
                    account_id = %account_id,
                    holding_usd,
                    tier = %tier.name,
                    "tier resolved from holdings"
                );
                self.store_tier(account_id, &tier.name, now).await?;
                Ok(tier)
            }
            Err(err) => {
                // Outage fallback: keep whatever tier the account last
                // held. The stale last_tier_check means the next call
                // retries the lookup.
                warn!(
                    account_id = %account_id,
                    error = %err,
                    "holdings lookup failed, keeping cached tier"
                );
                tier_by_name(&self.tiers, &row.cached_tier)
                    .cloned()
                    .ok_or_else(|| TallyError::Config("tier list is empty".to_string()))
            }
        }
    }

    /// USD value of the account's reward-token holdings.
    ///
    /// Both adapter calls run under bounded timeouts so a hung endpoint
    /// turns into the outage fallback instead of stalling the gate.
    async fn holdings_usd(&self, account_id: &AccountId) -> Result<f64, TallyError> {
        let holdings_timeout = std::time::Duration::from_millis(self.config.holdings_timeout_ms);
        let balance = match tokio::time::timeout(
            holdings_timeout,
            self.holdings.token_balance(account_id.as_str()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(TallyError::Timeout {
                    duration: holdings_timeout,
                });
            }
        };

        if balance <= 0.0 {
            return Ok(0.0);
        }

        let pricing_timeout = std::time::Duration::from_millis(self.config.pricing_timeout_ms);
        let price = match tokio::time::timeout(
            pricing_timeout,
            self.pricing.usd_price(&self.config.reward_token),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(TallyError::Timeout {
                    duration: pricing_timeout,
                });
            }
        };

        Ok(balance * price)
    }

    async fn load_account(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<tally_storage::AccountRow, TallyError> {
        let id = account_id.0.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(now);
        let reset_iso = to_iso(
            now + chrono::Duration::hours(i64::from(self.config.quota_window_hours)),
        );
        self.db
            .connection()
            .call(move |conn| {
                ensure_account(conn, &id, signup, &now_iso, &reset_iso)?;
                read_account(conn, &id)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn store_tier(
        &self,
        account_id: &AccountId,
        tier_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TallyError> {
        let id = account_id.0.clone();
        let tier = tier_name.to_string();
        let now_iso = to_iso(now);
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE accounts SET cached_tier = ?1, last_tier_check = ?2 WHERE id = ?3",
                    params![tier, now_iso, id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tally_config::model::default_tiers;
    use tally_test_utils::{memory_database, test_billing_config, MockHoldings, MockPricing};

    fn acct(id: &str) -> AccountId {
        AccountId(id.to_string())
    }

    #[test]
    fn select_tier_picks_highest_qualifying() {
        let tiers = default_tiers();
        let name = |usd: f64| select_tier(&tiers, usd).unwrap().name.clone();
        assert_eq!(name(0.0), "free");
        assert_eq!(name(99.99), "free");
        assert_eq!(name(100.0), "holder");
        assert_eq!(name(999.99), "holder");
        assert_eq!(name(1000.0), "whale");
        assert_eq!(name(1_000_000.0), "whale");
    }

    async fn resolver(holdings: MockHoldings, pricing: MockPricing) -> TierResolver {
        let db = memory_database().await;
        TierResolver::new(
            db,
            Arc::new(holdings),
            Arc::new(pricing),
            test_billing_config(),
            default_tiers(),
        )
    }

    #[tokio::test]
    async fn holdings_promote_to_holder_tier() {
        // 10_000 reward tokens at $0.05 = $500 -> holder.
        let holdings = MockHoldings::with_balance("w1", 10_000.0);
        let pricing = MockPricing::with_price("TALLY", 0.05);
        let resolver = resolver(holdings, pricing).await;

        let tier = resolver.resolve(&acct("w1")).await.unwrap();
        assert_eq!(tier.name, "holder");
    }

    #[tokio::test]
    async fn fresh_cache_skips_adapter_calls() {
        let holdings = MockHoldings::with_balance("w2", 50_000.0);
        let pricing = MockPricing::with_price("TALLY", 0.05);
        let resolver = resolver(holdings.clone(), pricing).await;
        let id = acct("w2");

        let t0 = parse_iso("2026-03-01T12:00:00Z").unwrap();
        let tier = resolver.resolve_at(&id, t0).await.unwrap();
        assert_eq!(tier.name, "whale");
        assert_eq!(holdings.calls(), 1);

        // Within the TTL the cached tier is served without a lookup.
        let tier = resolver
            .resolve_at(&id, t0 + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(tier.name, "whale");
        assert_eq!(holdings.calls(), 1);

        // Past the TTL the holdings are checked again.
        let tier = resolver
            .resolve_at(&id, t0 + Duration::seconds(301))
            .await
            .unwrap();
        assert_eq!(tier.name, "whale");
        assert_eq!(holdings.calls(), 2);
    }

    #[tokio::test]
    async fn outage_keeps_cached_tier() {
        let holdings = MockHoldings::with_balance("w3", 50_000.0);
        let pricing = MockPricing::with_price("TALLY", 0.05);
        let resolver = resolver(holdings.clone(), pricing).await;
        let id = acct("w3");

        let t0 = parse_iso("2026-03-01T12:00:00Z").unwrap();
        let tier = resolver.resolve_at(&id, t0).await.unwrap();
        assert_eq!(tier.name, "whale");

        // The holdings endpoint goes down past the TTL. The account is
        // not downgraded.
        holdings.fail();
        let tier = resolver
            .resolve_at(&id, t0 + Duration::seconds(600))
            .await
            .unwrap();
        assert_eq!(tier.name, "whale", "outage must not downgrade the tier");
    }

    #[tokio::test]
    async fn unknown_account_starts_free_even_during_outage() {
        let holdings = MockHoldings::failing();
        let pricing = MockPricing::empty();
        let resolver = resolver(holdings, pricing).await;

        let tier = resolver.resolve(&acct("w-new")).await.unwrap();
        assert_eq!(tier.name, "free");
    }

    #[tokio::test]
    async fn zero_balance_skips_price_lookup() {
        let holdings = MockHoldings::with_balance("w4", 0.0);
        let pricing = MockPricing::failing();
        let resolver = resolver(holdings, pricing.clone()).await;

        let tier = resolver.resolve(&acct("w4")).await.unwrap();
        assert_eq!(tier.name, "free");
        assert_eq!(pricing.calls(), 0, "no price needed for an empty wallet");
    }
}

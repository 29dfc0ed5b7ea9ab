// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deposit processing: converting confirmed external payments into
//! paid credits, idempotently.
//!
//! Delivery from the payment watcher is at-least-once. The sole defense
//! against replays is an atomic status compare-and-swap on the deposit
//! row (`pending -> credited`) committed in the same transaction as the
//! ledger credit. The price lookup happens before the transaction is
//! entered; credits are never granted on a guessed price.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use tally_config::model::BillingConfig;
use tally_core::{DepositEvent, DepositOutcome, PricingAdapter, TallyError, TierConfig};
use tally_storage::{map_tr_err, Database, DepositRow};
use tracing::{info, warn};

use crate::ledger::{ensure_account, read_account};
use crate::to_iso;

/// Credits granted for a USD value at the given price point, with a
/// percent bonus applied and the result floored.
///
/// The bonus is applied as `value * (100 + percent) / 100` so whole-USD
/// deposits with whole-percent bonuses stay exact in f64.
pub fn credits_for(usd_value: f64, price_per_thousand_usd: f64, bonus_percent: f64) -> i64 {
    let base = usd_value / price_per_thousand_usd * 1000.0;
    (base * (100.0 + bonus_percent) / 100.0).floor() as i64
}

/// Converts confirmed deposit events into credited balance.
#[derive(Clone)]
pub struct DepositProcessor {
    db: Database,
    pricing: Arc<dyn PricingAdapter>,
    config: BillingConfig,
    tiers: Vec<TierConfig>,
}

impl DepositProcessor {
    pub fn new(
        db: Database,
        pricing: Arc<dyn PricingAdapter>,
        config: BillingConfig,
        tiers: Vec<TierConfig>,
    ) -> Self {
        Self {
            db,
            pricing,
            config,
            tiers,
        }
    }

    fn is_stable(&self, token: &str) -> bool {
        self.config
            .stable_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token))
    }

    /// USD price for the deposited token. Stable tokens are 1:1 without
    /// a feed lookup; everything else goes through the pricing adapter
    /// under a bounded timeout.
    async fn usd_price(&self, token: &str) -> Result<f64, TallyError> {
        if self.is_stable(token) {
            return Ok(1.0);
        }
        let timeout = std::time::Duration::from_millis(self.config.pricing_timeout_ms);
        match tokio::time::timeout(timeout, self.pricing.usd_price(token)).await {
            Ok(result) => result,
            Err(_) => Err(TallyError::Timeout { duration: timeout }),
        }
    }

    /// Process one deposit event.
    pub async fn process(&self, event: &DepositEvent) -> Result<DepositOutcome, TallyError> {
        self.process_at(event, Utc::now()).await
    }

    /// Clock-injected variant of [`Self::process`].
    pub async fn process_at(
        &self,
        event: &DepositEvent,
        now: DateTime<Utc>,
    ) -> Result<DepositOutcome, TallyError> {
        // A malformed amount must never reach the ledger or the pending
        // table; retrying it would fail forever.
        if !event.amount.is_finite() || event.amount <= 0.0 {
            warn!(
                deposit_id = %event.deposit_id,
                amount = event.amount,
                "deposit event rejected"
            );
            return Ok(DepositOutcome::Rejected {
                reason: format!(
                    "deposit amount must be a positive finite number, got {}",
                    event.amount
                ),
            });
        }

        // Price first, outside any storage transaction. A feed outage
        // leaves the deposit pending for a later retry.
        let price = match self.usd_price(&event.token).await {
            Ok(price) if price > 0.0 => price,
            Ok(price) => {
                warn!(token = %event.token, price, "price feed returned non-positive price");
                self.record_pending(event, now).await?;
                return Ok(DepositOutcome::PricingUnavailable);
            }
            Err(err) => {
                warn!(token = %event.token, error = %err, "price lookup failed, deposit deferred");
                self.record_pending(event, now).await?;
                return Ok(DepositOutcome::PricingUnavailable);
            }
        };

        let usd_value = event.amount * price;
        let price_per_thousand = self.config.price_per_thousand_credits_usd;
        let is_reward_token = event.token.eq_ignore_ascii_case(&self.config.reward_token);
        let tiers = self.tiers.clone();

        let deposit_id = event.deposit_id.0.clone();
        let account_id = event.account_id.0.clone();
        let token = event.token.clone();
        let amount = event.amount;
        let confirmed_at = event.confirmed_at.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(now);
        let reset_iso = to_iso(now + Duration::hours(i64::from(self.config.quota_window_hours)));

        let outcome = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                ensure_account(&tx, &account_id, signup, &now_iso, &reset_iso)?;
                let account = read_account(&tx, &account_id)?;

                // The bonus percent comes from the account's cached tier;
                // no network lookup happens inside the commit path.
                let bonus_percent = if is_reward_token {
                    tiers
                        .iter()
                        .find(|t| t.name == account.cached_tier)
                        .or(tiers.first())
                        .map(|t| t.bonus_percent_for_reward_token)
                        .unwrap_or(0.0)
                } else {
                    0.0
                };
                let credits = credits_for(usd_value, price_per_thousand, bonus_percent);
                let bonus_applied = bonus_percent / 100.0;

                tx.execute(
                    "INSERT OR IGNORE INTO deposits \
                     (id, account_id, token, amount, status, confirmed_at) \
                     VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                    params![deposit_id, account_id, token, amount, confirmed_at],
                )?;

                // Idempotency gate: only the call that flips pending ->
                // credited gets to touch the ledger.
                let flipped = tx.execute(
                    "UPDATE deposits SET status = 'credited', usd_value = ?1, \
                     credits_granted = ?2, bonus_applied = ?3, credited_at = ?4 \
                     WHERE id = ?5 AND status = 'pending'",
                    params![usd_value, credits, bonus_applied, now_iso, deposit_id],
                )?;

                if flipped == 0 {
                    tx.commit()?;
                    return Ok(DepositOutcome::AlreadyProcessed);
                }

                tx.execute(
                    "UPDATE accounts SET paid_credits = paid_credits + ?1 WHERE id = ?2",
                    params![credits, account_id],
                )?;
                tx.commit()?;

                Ok(DepositOutcome::Credited {
                    credits,
                    usd_value,
                    bonus_applied,
                })
            })
            .await
            .map_err(map_tr_err)?;

        match &outcome {
            DepositOutcome::Credited { credits, .. } => {
                info!(
                    deposit_id = %event.deposit_id,
                    account_id = %event.account_id,
                    token = %event.token,
                    credits,
                    "deposit credited"
                );
            }
            DepositOutcome::AlreadyProcessed => {
                info!(deposit_id = %event.deposit_id, "duplicate deposit delivery ignored");
            }
            DepositOutcome::PricingUnavailable | DepositOutcome::Rejected { .. } => {}
        }

        Ok(outcome)
    }

    /// Record a deposit as pending without crediting (price unavailable).
    async fn record_pending(
        &self,
        event: &DepositEvent,
        now: DateTime<Utc>,
    ) -> Result<(), TallyError> {
        let deposit_id = event.deposit_id.0.clone();
        let account_id = event.account_id.0.clone();
        let token = event.token.clone();
        let amount = event.amount;
        let confirmed_at = event.confirmed_at.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(now);
        let reset_iso = to_iso(now + Duration::hours(i64::from(self.config.quota_window_hours)));

        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                ensure_account(&tx, &account_id, signup, &now_iso, &reset_iso)?;
                tx.execute(
                    "INSERT OR IGNORE INTO deposits \
                     (id, account_id, token, amount, status, confirmed_at) \
                     VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                    params![deposit_id, account_id, token, amount, confirmed_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Re-attempt every pending deposit. Returns how many were credited.
    ///
    /// Called periodically by the server loop so a price feed outage
    /// defers deposits instead of dropping them.
    pub async fn retry_pending(&self) -> Result<usize, TallyError> {
        let rows = self.pending().await?;
        let mut credited = 0;
        for row in rows {
            let event = DepositEvent {
                deposit_id: tally_core::DepositId(row.id),
                account_id: tally_core::AccountId(row.account_id),
                token: row.token,
                amount: row.amount,
                confirmed_at: row.confirmed_at,
            };
            if matches!(
                self.process(&event).await?,
                DepositOutcome::Credited { .. }
            ) {
                credited += 1;
            }
        }
        Ok(credited)
    }

    /// All deposits still awaiting a price.
    pub async fn pending(&self) -> Result<Vec<DepositRow>, TallyError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, account_id, token, amount, usd_value, credits_granted, \
                     bonus_applied, status, confirmed_at, credited_at \
                     FROM deposits WHERE status = 'pending' ORDER BY confirmed_at",
                )?;
                let rows = stmt.query_map([], DepositRow::from_row)?;
                let mut deposits = Vec::new();
                for row in rows {
                    deposits.push(row?);
                }
                Ok(deposits)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Deposit history for one account, newest first.
    pub async fn list_for_account(
        &self,
        account_id: &tally_core::AccountId,
        limit: u32,
    ) -> Result<Vec<DepositRow>, TallyError> {
        let id = account_id.0.clone();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, account_id, token, amount, usd_value, credits_granted, \
                     bonus_applied, status, confirmed_at, credited_at \
                     FROM deposits WHERE account_id = ?1 \
                     ORDER BY confirmed_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![id, limit], DepositRow::from_row)?;
                let mut deposits = Vec::new();
                for row in rows {
                    deposits.push(row?);
                }
                Ok(deposits)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{AccountId, DepositId};
    use tally_test_utils::{memory_database, test_billing_config, MockPricing};

    use crate::ledger::AccountLedger;

    fn event(id: &str, account: &str, token: &str, amount: f64) -> DepositEvent {
        DepositEvent {
            deposit_id: DepositId(id.to_string()),
            account_id: AccountId(account.to_string()),
            token: token.to_string(),
            amount,
            confirmed_at: "2026-03-01T10:00:00.000Z".to_string(),
        }
    }

    async fn setup(pricing: MockPricing) -> (DepositProcessor, AccountLedger) {
        let db = memory_database().await;
        let config = test_billing_config();
        let tiers = tally_config::model::default_tiers();
        (
            DepositProcessor::new(db.clone(), Arc::new(pricing), config.clone(), tiers),
            AccountLedger::new(db, config),
        )
    }

    #[test]
    fn bonus_math_is_exact() {
        // 1000 reward tokens at $0.01 = $10; $1 per 1000 credits; 20% bonus.
        assert_eq!(credits_for(10.0, 1.0, 20.0), 12_000);
        // 10 stable units, no bonus.
        assert_eq!(credits_for(10.0, 1.0, 0.0), 10_000);
        // Fractional results floor.
        assert_eq!(credits_for(0.0015, 1.0, 0.0), 1);
    }

    #[tokio::test]
    async fn stable_deposit_credits_one_to_one() {
        let (processor, ledger) = setup(MockPricing::empty()).await;
        let outcome = processor
            .process(&event("sig-1", "w1", "USDC", 10.0))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DepositOutcome::Credited {
                credits: 10_000,
                usd_value: 10.0,
                bonus_applied: 0.0,
            }
        );
        let snap = ledger.balance(&AccountId("w1".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 10_000);
    }

    #[tokio::test]
    async fn reward_token_deposit_gets_tier_bonus() {
        // Default free tier has a 10% reward-token bonus.
        let pricing = MockPricing::with_price("TALLY", 0.01);
        let (processor, ledger) = setup(pricing).await;
        let outcome = processor
            .process(&event("sig-2", "w2", "TALLY", 1000.0))
            .await
            .unwrap();
        match outcome {
            DepositOutcome::Credited {
                credits,
                bonus_applied,
                ..
            } => {
                assert_eq!(credits, 11_000);
                assert!((bonus_applied - 0.10).abs() < f64::EPSILON);
            }
            other => panic!("expected Credited, got {other:?}"),
        }
        let snap = ledger.balance(&AccountId("w2".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 11_000);
    }

    #[tokio::test]
    async fn duplicate_delivery_credits_once() {
        let (processor, ledger) = setup(MockPricing::empty()).await;
        let e = event("sig-3", "w3", "USDC", 5.0);

        let first = processor.process(&e).await.unwrap();
        assert!(matches!(first, DepositOutcome::Credited { .. }));

        let second = processor.process(&e).await.unwrap();
        assert_eq!(second, DepositOutcome::AlreadyProcessed);

        let snap = ledger.balance(&AccountId("w3".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 5_000, "balance unchanged by the replay");
    }

    #[tokio::test]
    async fn negative_deposit_amount_is_rejected_without_debiting() {
        let (processor, ledger) = setup(MockPricing::empty()).await;
        processor
            .process(&event("sig-fund", "w-neg", "USDC", 10.0))
            .await
            .unwrap();

        let outcome = processor
            .process(&event("sig-neg", "w-neg", "USDC", -5.0))
            .await
            .unwrap();
        assert!(matches!(outcome, DepositOutcome::Rejected { .. }));

        let snap = ledger.balance(&AccountId("w-neg".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 10_000, "balance untouched by the rejection");
        assert!(
            processor.pending().await.unwrap().is_empty(),
            "rejected events leave no pending row"
        );
    }

    #[tokio::test]
    async fn zero_and_non_finite_amounts_are_rejected() {
        let (processor, _) = setup(MockPricing::empty()).await;
        for (id, amount) in [("sig-z", 0.0), ("sig-nan", f64::NAN), ("sig-inf", f64::INFINITY)] {
            let outcome = processor
                .process(&event(id, "w-bad", "USDC", amount))
                .await
                .unwrap();
            assert!(
                matches!(outcome, DepositOutcome::Rejected { .. }),
                "amount {amount} must be rejected"
            );
        }
        assert!(processor.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pricing_outage_defers_deposit_then_retry_credits_once() {
        let pricing = MockPricing::failing();
        let (processor, ledger) = setup(pricing.clone()).await;
        let e = event("sig-4", "w4", "SOL", 2.0);

        let outcome = processor.process(&e).await.unwrap();
        assert_eq!(outcome, DepositOutcome::PricingUnavailable);
        assert_eq!(processor.pending().await.unwrap().len(), 1);
        let snap = ledger.balance(&AccountId("w4".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 0, "no credits on a guessed price");

        // Feed recovers; the retry loop credits exactly once.
        pricing.set_price("SOL", 50.0);
        assert_eq!(processor.retry_pending().await.unwrap(), 1);
        assert_eq!(processor.retry_pending().await.unwrap(), 0);

        let snap = ledger.balance(&AccountId("w4".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 100_000);
    }

    #[tokio::test]
    async fn concurrent_replays_credit_exactly_once() {
        let (processor, ledger) = setup(MockPricing::empty()).await;
        let e = event("sig-5", "w5", "USDC", 1.0);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let processor = processor.clone();
            let e = e.clone();
            handles.push(tokio::spawn(async move { processor.process(&e).await }));
        }

        let mut credited = 0;
        for handle in handles {
            if matches!(
                handle.await.unwrap().unwrap(),
                DepositOutcome::Credited { .. }
            ) {
                credited += 1;
            }
        }
        assert_eq!(credited, 1);

        let snap = ledger.balance(&AccountId("w5".into())).await.unwrap();
        assert_eq!(snap.paid_credits, 1_000);
    }
}

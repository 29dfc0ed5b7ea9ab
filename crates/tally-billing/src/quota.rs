// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account quota enforcement over fixed wall-clock windows.
//!
//! Window state lives on the account row (`quota_used`, `quota_reset_at`).
//! Reset logic is a pure function of `(now, reset_at, window)` with `now`
//! injected, so boundary behavior is deterministically testable. A reset
//! is a single jump to the window containing `now` — windows missed
//! during downtime are skipped, never replayed.
//!
//! The quota increment and the ledger debit commit in one transaction on
//! the single writer thread: a request that cannot be charged never burns
//! quota, and two concurrent calls at `used = limit - 1` admit exactly
//! one.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use tally_config::model::BillingConfig;
use tally_core::{AccountId, GateDecision, TallyError, TierConfig};
use tally_storage::{map_tr_err, Database};
use tracing::debug;

use crate::ledger::{ensure_account, read_account};
use crate::{parse_iso, to_iso};

/// Advance `reset_at` past `now` in a single jump.
///
/// Returns `reset_at` unchanged while the current window is still open.
/// Otherwise returns the end of the window containing `now`, skipping
/// however many whole windows elapsed in between.
pub fn advance_reset(
    reset_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> DateTime<Utc> {
    if now < reset_at {
        return reset_at;
    }
    let missed = (now - reset_at).num_seconds() / window.num_seconds();
    reset_at + window * (missed as i32 + 1)
}

/// Whole seconds until the window closes. Never negative.
pub fn seconds_until(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (reset_at - now).num_seconds().max(0)
}

/// Gatekeeper for per-account daily quotas and credit consumption.
#[derive(Clone)]
pub struct QuotaEnforcer {
    db: Database,
    config: BillingConfig,
}

impl QuotaEnforcer {
    pub fn new(db: Database, config: BillingConfig) -> Self {
        Self { db, config }
    }

    fn window(&self) -> Duration {
        Duration::hours(i64::from(self.config.quota_window_hours))
    }

    /// Check quota and consume credits for one gated call.
    pub async fn check_and_consume(
        &self,
        account_id: &AccountId,
        cost: i64,
        tier: &TierConfig,
    ) -> Result<GateDecision, TallyError> {
        self.check_and_consume_at(account_id, cost, tier, Utc::now())
            .await
    }

    /// Clock-injected variant of [`Self::check_and_consume`].
    ///
    /// Decision order: window reset, then quota limit, then balance.
    /// Only the fully-allowed path mutates quota and balance, and it does
    /// so in a single committed transaction as the last step.
    pub async fn check_and_consume_at(
        &self,
        account_id: &AccountId,
        cost: i64,
        tier: &TierConfig,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, TallyError> {
        if cost < 0 {
            return Err(TallyError::Internal(format!(
                "gate cost must be non-negative, got {cost}"
            )));
        }

        let id = account_id.0.clone();
        let signup = self.config.signup_free_credits;
        let window = self.window();
        let daily_limit = tier.daily_limit;
        let tier_name = tier.name.clone();
        let now_iso = to_iso(now);
        let initial_reset_iso = to_iso(now + window);

        let decision = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                ensure_account(&tx, &id, signup, &now_iso, &initial_reset_iso)?;
                let row = read_account(&tx, &id)?;

                // A malformed stored timestamp starts a fresh window
                // rather than wedging the account.
                let stored_reset = parse_iso(&row.quota_reset_at).unwrap_or(now);
                let reset_at = advance_reset(stored_reset, now, window);
                let was_reset = reset_at != stored_reset;
                let used = if was_reset { 0 } else { row.quota_used };

                let total = row.free_credits + row.paid_credits;
                let decision = if used + 1 > i64::from(daily_limit) {
                    GateDecision::QuotaExceeded {
                        daily_limit,
                        resets_in_secs: seconds_until(reset_at, now),
                    }
                } else if total < cost {
                    // Persist the window advance so a later top-up does
                    // not resurrect a stale window, but leave `used`
                    // untouched: this call was never charged.
                    if was_reset {
                        tx.execute(
                            "UPDATE accounts SET quota_used = 0, quota_reset_at = ?1 \
                             WHERE id = ?2",
                            params![to_iso(reset_at), id],
                        )?;
                    }
                    GateDecision::CreditsExhausted { available: total }
                } else {
                    let new_free = row.free_credits - row.free_credits.min(cost);
                    let new_paid = row.paid_credits - (cost - row.free_credits).max(0);
                    tx.execute(
                        "UPDATE accounts SET free_credits = ?1, paid_credits = ?2, \
                         quota_used = ?3, quota_reset_at = ?4 WHERE id = ?5",
                        params![new_free, new_paid, used + 1, to_iso(reset_at), id],
                    )?;
                    GateDecision::Allowed {
                        tier: tier_name,
                        remaining_today: daily_limit - (used as u32 + 1),
                        remaining_credits: new_free + new_paid,
                    }
                };
                // Commit is the last step of every path; the lazy account
                // insert persists even on a rejection.
                tx.commit()?;
                Ok(decision)
            })
            .await
            .map_err(map_tr_err)?;

        debug!(account_id = %account_id, cost, ?decision, "gate decision");
        Ok(decision)
    }
}

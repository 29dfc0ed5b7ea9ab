// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account ledger: authoritative free/paid credit balances.
//!
//! Consumption drains free credits before paid credits, so paid credits
//! keep their monetary value as long as possible. `reserve_and_consume`
//! is a single conditional UPDATE guarded by `free + paid >= cost`; two
//! concurrent calls against a balance sufficient for only one resolve to
//! exactly one success because every mutation runs on the one
//! tokio-rusqlite background thread.

use chrono::{Duration, Utc};
use rusqlite::params;
use tally_config::model::BillingConfig;
use tally_core::{AccountId, BalanceSnapshot, ConsumeOutcome, CreditKind, TallyError};
use tally_storage::{map_tr_err, AccountRow, Database};
use tracing::info;

use crate::to_iso;

/// Insert the account row if it does not exist yet.
///
/// Lazily-created accounts start at the lowest tier (schema default)
/// with the configured signup grant of free credits and a quota window
/// opening now.
pub(crate) fn ensure_account(
    conn: &rusqlite::Connection,
    id: &str,
    signup_free_credits: i64,
    now_iso: &str,
    reset_iso: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO accounts (id, free_credits, quota_reset_at, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![id, signup_free_credits, reset_iso, now_iso],
    )?;
    Ok(())
}

/// Read the full account row. The row must exist.
pub(crate) fn read_account(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<AccountRow, rusqlite::Error> {
    conn.query_row(
        "SELECT id, free_credits, paid_credits, cached_tier, last_tier_check, \
         quota_used, quota_reset_at, created_at FROM accounts WHERE id = ?1",
        params![id],
        AccountRow::from_row,
    )
}

/// Authoritative store of per-account credit balances.
#[derive(Clone)]
pub struct AccountLedger {
    db: Database,
    config: BillingConfig,
}

impl AccountLedger {
    pub fn new(db: Database, config: BillingConfig) -> Self {
        Self { db, config }
    }

    /// Initial `quota_reset_at` for a lazily-created account.
    fn initial_reset_iso(&self) -> String {
        to_iso(Utc::now() + Duration::hours(i64::from(self.config.quota_window_hours)))
    }

    /// Current balances and cached tier, creating the account if needed.
    pub async fn balance(&self, account_id: &AccountId) -> Result<BalanceSnapshot, TallyError> {
        let id = account_id.0.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(Utc::now());
        let reset_iso = self.initial_reset_iso();

        let row = self
            .db
            .connection()
            .call(move |conn| {
                ensure_account(conn, &id, signup, &now_iso, &reset_iso)?;
                read_account(conn, &id)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(BalanceSnapshot {
            account_id: account_id.clone(),
            free_credits: row.free_credits,
            paid_credits: row.paid_credits,
            tier: row.cached_tier,
        })
    }

    /// Grant credits to an account. Returns the new total balance.
    pub async fn credit(
        &self,
        account_id: &AccountId,
        amount: i64,
        kind: CreditKind,
    ) -> Result<i64, TallyError> {
        if amount < 0 {
            return Err(TallyError::Internal(format!(
                "credit amount must be non-negative, got {amount}"
            )));
        }
        let id = account_id.0.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(Utc::now());
        let reset_iso = self.initial_reset_iso();

        let total = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                ensure_account(&tx, &id, signup, &now_iso, &reset_iso)?;
                let column = match kind {
                    CreditKind::Free => "free_credits",
                    CreditKind::Paid => "paid_credits",
                };
                tx.execute(
                    &format!("UPDATE accounts SET {column} = {column} + ?1 WHERE id = ?2"),
                    params![amount, id],
                )?;
                let row = read_account(&tx, &id)?;
                tx.commit()?;
                Ok(row.free_credits + row.paid_credits)
            })
            .await
            .map_err(map_tr_err)?;

        info!(account_id = %account_id, amount, kind = %kind, total, "credits granted");
        Ok(total)
    }

    /// Atomically deduct `cost` credits, free before paid.
    ///
    /// On insufficient total balance nothing is deducted.
    pub async fn reserve_and_consume(
        &self,
        account_id: &AccountId,
        cost: i64,
    ) -> Result<ConsumeOutcome, TallyError> {
        if cost < 0 {
            return Err(TallyError::Internal(format!(
                "consume cost must be non-negative, got {cost}"
            )));
        }
        let id = account_id.0.clone();
        let signup = self.config.signup_free_credits;
        let now_iso = to_iso(Utc::now());
        let reset_iso = self.initial_reset_iso();

        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                ensure_account(&tx, &id, signup, &now_iso, &reset_iso)?;

                // Conditional update: the WHERE guard makes this a
                // compare-and-swap. RHS expressions see pre-update values,
                // so free is drained before paid in one statement.
                let changed = tx.execute(
                    "UPDATE accounts SET \
                        free_credits = free_credits - MIN(free_credits, ?1), \
                        paid_credits = paid_credits - MAX(0, ?1 - free_credits) \
                     WHERE id = ?2 AND free_credits + paid_credits >= ?1",
                    params![cost, id],
                )?;

                let row = read_account(&tx, &id)?;
                tx.commit()?;

                let total = row.free_credits + row.paid_credits;
                if changed == 1 {
                    Ok(ConsumeOutcome::Consumed { remaining: total })
                } else {
                    Ok(ConsumeOutcome::InsufficientCredits { available: total })
                }
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_test_utils::{memory_database, test_billing_config};

    async fn ledger() -> AccountLedger {
        let db = memory_database().await;
        AccountLedger::new(db, test_billing_config())
    }

    fn acct(id: &str) -> AccountId {
        AccountId(id.to_string())
    }

    #[tokio::test]
    async fn lazy_creation_grants_signup_credits() {
        let ledger = ledger().await;
        let snap = ledger.balance(&acct("wallet-1")).await.unwrap();
        // test_billing_config grants 5 free credits on signup.
        assert_eq!(snap.free_credits, 5);
        assert_eq!(snap.paid_credits, 0);
        assert_eq!(snap.tier, "free");
    }

    #[tokio::test]
    async fn free_credits_drain_before_paid() {
        let ledger = ledger().await;
        let id = acct("wallet-2");
        ledger.credit(&id, 10, CreditKind::Paid).await.unwrap();

        // signup free = 5, paid = 10. Consuming 7 should take all 5 free
        // and 2 paid.
        let outcome = ledger.reserve_and_consume(&id, 7).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed { remaining: 8 });

        let snap = ledger.balance(&id).await.unwrap();
        assert_eq!(snap.free_credits, 0);
        assert_eq!(snap.paid_credits, 8);
    }

    #[tokio::test]
    async fn five_free_credits_allow_exactly_five_calls() {
        let ledger = ledger().await;
        let id = acct("wallet-3");

        for i in 0..5 {
            let outcome = ledger.reserve_and_consume(&id, 1).await.unwrap();
            assert_eq!(
                outcome,
                ConsumeOutcome::Consumed { remaining: 4 - i },
                "call {i} should consume"
            );
        }
        let outcome = ledger.reserve_and_consume(&id, 1).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::InsufficientCredits { available: 0 });
    }

    #[tokio::test]
    async fn insufficient_balance_deducts_nothing() {
        let ledger = ledger().await;
        let id = acct("wallet-4");

        let outcome = ledger.reserve_and_consume(&id, 100).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::InsufficientCredits { available: 5 });

        let snap = ledger.balance(&id).await.unwrap();
        assert_eq!(snap.free_credits, 5, "rejection must not partially deduct");
    }

    #[tokio::test]
    async fn concurrent_consumption_never_double_spends() {
        let ledger = ledger().await;
        let id = acct("wallet-5");
        // 5 signup free + 15 paid = 20 total; 30 tasks of cost 1.
        ledger.credit(&id, 15, CreditKind::Paid).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..30 {
            let ledger = ledger.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve_and_consume(&id, 1).await.unwrap()
            }));
        }

        let mut consumed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ConsumeOutcome::Consumed { .. }) {
                consumed += 1;
            }
        }

        assert_eq!(consumed, 20, "exactly the available balance is spent");
        let snap = ledger.balance(&id).await.unwrap();
        assert_eq!(snap.total(), 0);
    }

    #[tokio::test]
    async fn negative_amounts_are_internal_errors() {
        let ledger = ledger().await;
        let id = acct("wallet-6");
        assert!(ledger.credit(&id, -1, CreditKind::Free).await.is_err());
        assert!(ledger.reserve_and_consume(&id, -1).await.is_err());
    }
}

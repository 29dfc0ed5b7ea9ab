// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only usage audit log.
//!
//! Every billed call lands here after the gate admits it. Recording is
//! best-effort from the gate's perspective (`record` logs and swallows
//! storage errors) because the credits were already spent; losing one
//! audit row is better than failing the admitted request.

use chrono::Utc;
use rusqlite::params;
use tally_core::{AccountId, TallyError, UsageRecord};
use tally_storage::{map_tr_err, Database, UsageRow};
use tracing::warn;
use uuid::Uuid;

use crate::to_iso;

/// Aggregate usage for one account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UsageSummary {
    pub total_api_calls: i64,
    pub total_credits_spent: i64,
}

/// Writer and reader for the `usage_log` table.
#[derive(Clone)]
pub struct UsageLog {
    db: Database,
}

impl UsageLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one usage entry. Returns the stored record.
    pub async fn append(
        &self,
        account_id: &AccountId,
        endpoint: &str,
        method: &str,
        credits_consumed: i64,
    ) -> Result<UsageRecord, TallyError> {
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.clone(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            credits_consumed,
            created_at: to_iso(Utc::now()),
        };

        let row = record.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage_log (id, account_id, endpoint, method, \
                     credits_consumed, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id,
                        row.account_id.0,
                        row.endpoint,
                        row.method,
                        row.credits_consumed,
                        row.created_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        Ok(record)
    }

    /// Best-effort append. A storage failure is logged, not propagated.
    pub async fn record(
        &self,
        account_id: &AccountId,
        endpoint: &str,
        method: &str,
        credits_consumed: i64,
    ) {
        if let Err(err) = self
            .append(account_id, endpoint, method, credits_consumed)
            .await
        {
            warn!(
                account_id = %account_id,
                endpoint,
                error = %err,
                "failed to record usage entry"
            );
        }
    }

    /// Most recent entries for an account, newest first.
    pub async fn recent(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, TallyError> {
        let id = account_id.0.clone();
        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, account_id, endpoint, method, credits_consumed, created_at \
                     FROM usage_log WHERE account_id = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                )?;
                let mapped = stmt.query_map(params![id, limit], UsageRow::from_row)?;
                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row?);
                }
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(rows.into_iter().map(UsageRecord::from).collect())
    }

    /// Entries for an account within an inclusive ISO 8601 time window.
    ///
    /// Stored timestamps sort lexicographically, so the bounds compare
    /// directly as text.
    pub async fn range(
        &self,
        account_id: &AccountId,
        from: &str,
        to: &str,
    ) -> Result<Vec<UsageRecord>, TallyError> {
        let id = account_id.0.clone();
        let from = from.to_string();
        let to = to.to_string();
        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, account_id, endpoint, method, credits_consumed, created_at \
                     FROM usage_log \
                     WHERE account_id = ?1 AND created_at >= ?2 AND created_at <= ?3 \
                     ORDER BY created_at DESC, id DESC",
                )?;
                let mapped = stmt.query_map(params![id, from, to], UsageRow::from_row)?;
                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row?);
                }
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(rows.into_iter().map(UsageRecord::from).collect())
    }

    /// Lifetime totals for an account.
    pub async fn summary(&self, account_id: &AccountId) -> Result<UsageSummary, TallyError> {
        let id = account_id.0.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(credits_consumed), 0) \
                     FROM usage_log WHERE account_id = ?1",
                    params![id],
                    |row| {
                        Ok(UsageSummary {
                            total_api_calls: row.get(0)?,
                            total_credits_spent: row.get(1)?,
                        })
                    },
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_test_utils::memory_database;

    fn acct(id: &str) -> AccountId {
        AccountId(id.to_string())
    }

    #[tokio::test]
    async fn append_then_recent_returns_entries() {
        let log = UsageLog::new(memory_database().await);
        let id = acct("w1");

        log.append(&id, "/api/generate", "POST", 1).await.unwrap();
        log.append(&id, "/api/search", "GET", 2).await.unwrap();

        let rows = log.recent(&id, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.endpoint == "/api/generate"));
        assert!(rows.iter().all(|r| r.account_id == id));
    }

    #[tokio::test]
    async fn recent_respects_limit_and_isolates_accounts() {
        let log = UsageLog::new(memory_database().await);
        let a = acct("w-a");
        let b = acct("w-b");

        for _ in 0..5 {
            log.append(&a, "/api/generate", "POST", 1).await.unwrap();
        }
        log.append(&b, "/api/generate", "POST", 1).await.unwrap();

        assert_eq!(log.recent(&a, 3).await.unwrap().len(), 3);
        assert_eq!(log.recent(&b, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn range_bounds_are_inclusive_text_comparisons() {
        let log = UsageLog::new(memory_database().await);
        let id = acct("w-range");

        log.append(&id, "/api/generate", "POST", 1).await.unwrap();

        // The appended row's timestamp is "now"; a window spanning all
        // of it matches, a window ending before 2000 does not.
        let all = log
            .range(&id, "2000-01-01T00:00:00.000Z", "2100-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        let none = log
            .range(&id, "1990-01-01T00:00:00.000Z", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn summary_totals_calls_and_credits() {
        let log = UsageLog::new(memory_database().await);
        let id = acct("w2");

        log.append(&id, "/api/generate", "POST", 3).await.unwrap();
        log.append(&id, "/api/generate", "POST", 2).await.unwrap();

        let summary = log.summary(&id).await.unwrap();
        assert_eq!(
            summary,
            UsageSummary {
                total_api_calls: 2,
                total_credits_spent: 5,
            }
        );
    }

    #[tokio::test]
    async fn summary_of_unknown_account_is_zero() {
        let log = UsageLog::new(memory_database().await);
        let summary = log.summary(&acct("nobody")).await.unwrap();
        assert_eq!(summary.total_api_calls, 0);
        assert_eq!(summary.total_credits_spent, 0);
    }
}

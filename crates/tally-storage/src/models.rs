// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types mapping SQLite rows to domain values.
//!
//! Timestamps are stored as ISO 8601 text (`%Y-%m-%dT%H:%M:%S%.3fZ`),
//! which sorts lexicographically and compares correctly in SQL.

use tally_core::{AccountId, UsageRecord};

/// One row of the `accounts` table.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: String,
    pub free_credits: i64,
    pub paid_credits: i64,
    pub cached_tier: String,
    /// ISO 8601; `None` means holdings were never checked.
    pub last_tier_check: Option<String>,
    pub quota_used: i64,
    /// ISO 8601 end of the current quota window.
    pub quota_reset_at: String,
    pub created_at: String,
}

impl AccountRow {
    /// Map a SELECT over all account columns, in schema order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            free_credits: row.get(1)?,
            paid_credits: row.get(2)?,
            cached_tier: row.get(3)?,
            last_tier_check: row.get(4)?,
            quota_used: row.get(5)?,
            quota_reset_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// One row of the `deposits` table.
#[derive(Debug, Clone)]
pub struct DepositRow {
    pub id: String,
    pub account_id: String,
    pub token: String,
    pub amount: f64,
    /// USD value at crediting time; `None` while pending.
    pub usd_value: Option<f64>,
    /// Credits granted; `None` while pending.
    pub credits_granted: Option<i64>,
    /// Bonus fraction applied (0.2 for 20%).
    pub bonus_applied: f64,
    /// "pending" or "credited".
    pub status: String,
    pub confirmed_at: String,
    pub credited_at: Option<String>,
}

impl DepositRow {
    /// Map a SELECT over all deposit columns, in schema order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            token: row.get(2)?,
            amount: row.get(3)?,
            usd_value: row.get(4)?,
            credits_granted: row.get(5)?,
            bonus_applied: row.get(6)?,
            status: row.get(7)?,
            confirmed_at: row.get(8)?,
            credited_at: row.get(9)?,
        })
    }
}

/// One row of the `usage_log` table.
#[derive(Debug, Clone)]
pub struct UsageRow {
    pub id: String,
    pub account_id: String,
    pub endpoint: String,
    pub method: String,
    pub credits_consumed: i64,
    pub created_at: String,
}

impl UsageRow {
    /// Map a SELECT over all usage columns, in schema order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            endpoint: row.get(2)?,
            method: row.get(3)?,
            credits_consumed: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        UsageRecord {
            id: row.id,
            account_id: AccountId(row.account_id),
            endpoint: row.endpoint,
            method: row.method,
            credits_consumed: row.credits_consumed,
            created_at: row.created_at,
        }
    }
}

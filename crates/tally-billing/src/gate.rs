// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The billing gate: single entry point for admitting billable calls.
//!
//! Check order is cheapest-first: per-minute rate limit (in-memory),
//! then daily quota and credit balance (one storage transaction, via
//! [`QuotaEnforcer`]). The rate limiter is a fixed one-minute window
//! keyed by account id; it deliberately lives in process memory only —
//! a restart forgiving at most one minute of burst is an acceptable
//! trade for keeping the hot path off the writer thread.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tally_core::{AccountId, GateDecision, TallyError};

use crate::quota::QuotaEnforcer;
use crate::tier::TierResolver;
use crate::usage::UsageLog;

#[derive(Debug, Clone, Copy)]
struct MinuteWindow {
    minute: i64,
    count: u32,
}

/// Facade combining tier resolution, rate limiting, quota, and credits.
#[derive(Clone)]
pub struct BillingGate {
    tiers: TierResolver,
    quota: QuotaEnforcer,
    usage: UsageLog,
    windows: Arc<DashMap<String, MinuteWindow>>,
}

impl BillingGate {
    pub fn new(tiers: TierResolver, quota: QuotaEnforcer, usage: UsageLog) -> Self {
        Self {
            tiers,
            quota,
            usage,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Admit or reject one billable call of the given credit cost.
    ///
    /// On `Allowed` the quota slot and credits have already been
    /// consumed; the caller performs the operation and then calls
    /// [`Self::settle`].
    pub async fn check(
        &self,
        account_id: &AccountId,
        cost: i64,
    ) -> Result<GateDecision, TallyError> {
        self.check_at(account_id, cost, Utc::now()).await
    }

    /// Clock-injected variant of [`Self::check`].
    pub async fn check_at(
        &self,
        account_id: &AccountId,
        cost: i64,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, TallyError> {
        let tier = self.tiers.resolve_at(account_id, now).await?;

        if let Some(retry_after_secs) =
            self.rate_limited(account_id, tier.rate_limit_per_minute, now)
        {
            return Ok(GateDecision::RateLimited { retry_after_secs });
        }

        self.quota
            .check_and_consume_at(account_id, cost, &tier, now)
            .await
    }

    /// Fixed-window per-minute limit. Returns seconds until the window
    /// rolls over when the account is over its tier's rate.
    fn rate_limited(
        &self,
        account_id: &AccountId,
        per_minute: u32,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let minute = now.timestamp().div_euclid(60);
        let mut entry = self
            .windows
            .entry(account_id.0.clone())
            .or_insert(MinuteWindow { minute, count: 0 });
        if entry.minute != minute {
            entry.minute = minute;
            entry.count = 0;
        }
        if entry.count >= per_minute {
            let retry = 60 - now.timestamp().rem_euclid(60);
            return Some(retry as u64);
        }
        entry.count += 1;
        None
    }

    /// Record usage for a call the gate admitted. Best-effort.
    pub async fn settle(&self, account_id: &AccountId, endpoint: &str, method: &str, cost: i64) {
        self.usage.record(account_id, endpoint, method, cost).await;
    }
}

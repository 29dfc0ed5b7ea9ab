// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared types for the Tally credit ledger service.
//!
//! Business-rule outcomes (`ConsumeOutcome`, `GateDecision`,
//! `DepositOutcome`) are plain enums returned in the `Ok` arm of ledger
//! and gate operations. They carry enough context (seconds until reset,
//! remaining balance) for user-facing messages to be actionable.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a billing account.
///
/// Account ids double as wallet addresses for the holdings lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deposit deduplication key (e.g. an on-chain transaction signature).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositId(pub String);

impl std::fmt::Display for DepositId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static configuration for one service tier.
///
/// Tiers form an ordered list with ascending `min_holding_usd`; the tier
/// resolver picks the highest tier whose threshold is met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name (e.g. "free", "holder", "whale").
    pub name: String,
    /// Minimum USD value of holdings required to qualify.
    pub min_holding_usd: f64,
    /// Maximum gated calls per quota window.
    pub daily_limit: u32,
    /// Maximum gated calls per minute.
    pub rate_limit_per_minute: u32,
    /// Extra credit percent granted when depositing the reward token.
    pub bonus_percent_for_reward_token: f64,
}

/// Which balance bucket a credit grant targets.
///
/// Free credits are drained before paid credits on consumption, so paid
/// credits keep their monetary value as long as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreditKind {
    Free,
    Paid,
}

/// Lifecycle status of a deposit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Credited,
}

/// Point-in-time view of an account's balances and tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub free_credits: i64,
    pub paid_credits: i64,
    /// Name of the cached tier.
    pub tier: String,
}

impl BalanceSnapshot {
    /// Total spendable credits.
    pub fn total(&self) -> i64 {
        self.free_credits + self.paid_credits
    }
}

/// Result of a ledger consumption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Credits were deducted; `remaining` is the post-deduction total.
    Consumed { remaining: i64 },
    /// Total balance was below the requested cost; nothing was deducted.
    InsufficientCredits { available: i64 },
}

/// Result of a gate (quota + credit) check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// The operation may proceed; quota and credits were consumed.
    Allowed {
        tier: String,
        remaining_today: u32,
        remaining_credits: i64,
    },
    /// Too many calls this minute; retry after the window rolls over.
    RateLimited { retry_after_secs: u64 },
    /// The daily quota for the account's tier is spent.
    QuotaExceeded {
        daily_limit: u32,
        resets_in_secs: i64,
    },
    /// Quota was available but the credit balance cannot cover the cost.
    CreditsExhausted { available: i64 },
}

/// Inbound deposit event from the external payment watcher.
///
/// Delivery is at-least-once; `deposit_id` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub deposit_id: DepositId,
    pub account_id: AccountId,
    /// Token symbol (e.g. "USDC", "SOL", or the reward token).
    pub token: String,
    /// Amount in token units.
    pub amount: f64,
    /// ISO 8601 confirmation timestamp from the watcher.
    pub confirmed_at: String,
}

/// Result of processing a deposit event.
#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    /// The deposit was converted and credited.
    Credited {
        credits: i64,
        usd_value: f64,
        /// Bonus fraction applied (0.2 for a 20% bonus).
        bonus_applied: f64,
    },
    /// This deposit id was already credited; the ledger was not touched.
    AlreadyProcessed,
    /// The price lookup failed; the deposit stays pending for retry.
    PricingUnavailable,
    /// The event was malformed (non-positive or non-finite amount) and
    /// was not recorded; nothing to retry.
    Rejected { reason: String },
}

/// One immutable entry in the usage audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    pub account_id: AccountId,
    /// Logical endpoint that was billed (e.g. "/api/generate").
    pub endpoint: String,
    /// HTTP method or operation verb.
    pub method: String,
    pub credits_consumed: i64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn credit_kind_round_trips_lowercase() {
        assert_eq!(CreditKind::Free.to_string(), "free");
        assert_eq!(CreditKind::from_str("paid").unwrap(), CreditKind::Paid);
    }

    #[test]
    fn deposit_status_round_trips_lowercase() {
        assert_eq!(DepositStatus::Pending.to_string(), "pending");
        assert_eq!(
            DepositStatus::from_str("credited").unwrap(),
            DepositStatus::Credited
        );
    }

    #[test]
    fn balance_snapshot_total() {
        let snap = BalanceSnapshot {
            account_id: AccountId("acct-1".into()),
            free_credits: 5,
            paid_credits: 12,
            tier: "free".into(),
        };
        assert_eq!(snap.total(), 17);
    }

    #[test]
    fn gate_decision_serializes_with_tag() {
        let decision = GateDecision::QuotaExceeded {
            daily_limit: 25,
            resets_in_secs: 3600,
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"decision\":\"quota_exceeded\""));
        assert!(json.contains("\"resets_in_secs\":3600"));
    }

    #[test]
    fn deposit_event_deserializes() {
        let json = r#"{
            "deposit_id": "5sig",
            "account_id": "wallet-1",
            "token": "USDC",
            "amount": 10.0,
            "confirmed_at": "2026-03-01T00:00:00Z"
        }"#;
        let event: DepositEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.deposit_id.0, "5sig");
        assert_eq!(event.token, "USDC");
    }
}

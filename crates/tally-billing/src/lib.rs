// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger and tiered quota enforcement for the Tally service.
//!
//! This crate provides:
//! - **Account ledger**: free/paid credit balances with atomic consumption
//! - **Deposit processor**: idempotent conversion of external payments into credits
//! - **Tier resolver**: holdings-derived tier with TTL cache and outage fallback
//! - **Quota enforcer**: per-account daily windows with single-jump resets
//! - **Usage log**: append-only audit trail for billing history
//! - **Billing gate**: the facade every billable operation goes through
//!
//! All balance and quota mutations run as closures on the single
//! `tokio-rusqlite` background thread, each inside a transaction, which
//! serializes per-account updates without any in-process locks.

pub mod deposit;
pub mod gate;
pub mod ledger;
pub mod quota;
pub mod tier;
pub mod usage;

pub use deposit::DepositProcessor;
pub use gate::BillingGate;
pub use ledger::AccountLedger;
pub use quota::QuotaEnforcer;
pub use tier::TierResolver;
pub use usage::{UsageLog, UsageSummary};

use chrono::{DateTime, Utc};

/// Format a timestamp the way every table stores it.
pub(crate) fn to_iso(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a stored ISO 8601 timestamp.
pub(crate) fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

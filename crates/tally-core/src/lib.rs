// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally credit ledger service.
//!
//! This crate provides the error taxonomy, shared types, and adapter
//! traits used throughout the Tally workspace. External collaborators
//! (price feeds, token-holdings lookups) implement the traits defined
//! here; everything else consumes them.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TallyError;
pub use traits::{HoldingsAdapter, PricingAdapter};
pub use types::{
    AccountId, BalanceSnapshot, ConsumeOutcome, CreditKind, DepositEvent, DepositId,
    DepositOutcome, DepositStatus, GateDecision, TierConfig, UsageRecord,
};

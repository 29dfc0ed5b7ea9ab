// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Holdings adapter trait for external wallet balance lookups.

use async_trait::async_trait;

use crate::error::TallyError;

/// Supplies a wallet's balance of the tier-qualifying token.
#[async_trait]
pub trait HoldingsAdapter: Send + Sync {
    /// Current balance of the qualifying token held by `wallet`,
    /// in token units.
    async fn token_balance(&self, wallet: &str) -> Result<f64, TallyError>;
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing adapter trait for external token price feeds.

use async_trait::async_trait;

use crate::error::TallyError;

/// Supplies the current USD price for a token.
///
/// Implementations may serve slightly stale prices; staleness beyond a
/// few minutes should surface as an `Err` so deposits stay pending
/// rather than being credited against a guessed price.
#[async_trait]
pub trait PricingAdapter: Send + Sync {
    /// Current USD price for one unit of `token`.
    async fn usd_price(&self, token: &str) -> Result<f64, TallyError>;
}

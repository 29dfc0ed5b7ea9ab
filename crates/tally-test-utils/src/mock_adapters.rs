// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock pricing and holdings adapters for deterministic testing.
//!
//! Both mocks share their state through `Arc`, so a cloned handle kept
//! by the test can reprice tokens or toggle an outage while the adapter
//! is already wired into the component under test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tally_core::{HoldingsAdapter, PricingAdapter, TallyError};

/// A mock price feed with per-token prices.
///
/// Lookups for tokens without a configured price fail, as do all lookups
/// while the failure flag is set.
#[derive(Clone)]
pub struct MockPricing {
    prices: Arc<Mutex<HashMap<String, f64>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockPricing {
    /// No prices configured; every lookup fails.
    pub fn empty() -> Self {
        Self {
            prices: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One token priced; others fail.
    pub fn with_price(token: &str, price: f64) -> Self {
        let mock = Self::empty();
        mock.set_price(token, price);
        mock
    }

    /// Every lookup fails until a price is set.
    pub fn failing() -> Self {
        let mock = Self::empty();
        mock.failing.store(true, Ordering::SeqCst);
        mock
    }

    /// Set or update a token price and clear the failure flag.
    pub fn set_price(&self, token: &str, price: f64) {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_uppercase(), price);
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Number of lookups made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingAdapter for MockPricing {
    async fn usd_price(&self, token: &str) -> Result<f64, TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TallyError::Adapter {
                message: "mock price feed offline".to_string(),
                source: None,
            });
        }
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&token.to_uppercase())
            .copied()
            .ok_or_else(|| TallyError::Adapter {
                message: format!("no mock price for token {token}"),
                source: None,
            })
    }
}

/// A mock wallet holdings lookup.
///
/// Wallets without a configured balance report zero. The failure flag
/// turns every lookup into an error to simulate an outage.
#[derive(Clone)]
pub struct MockHoldings {
    balances: Arc<Mutex<HashMap<String, f64>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockHoldings {
    /// Every wallet reports a zero balance.
    pub fn empty() -> Self {
        Self {
            balances: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One wallet with a balance; others report zero.
    pub fn with_balance(wallet: &str, balance: f64) -> Self {
        let mock = Self::empty();
        mock.set_balance(wallet, balance);
        mock
    }

    /// Every lookup fails.
    pub fn failing() -> Self {
        let mock = Self::empty();
        mock.failing.store(true, Ordering::SeqCst);
        mock
    }

    /// Set or update a wallet balance.
    pub fn set_balance(&self, wallet: &str, balance: f64) {
        self.balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(wallet.to_string(), balance);
    }

    /// Start failing every lookup from now on.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Stop failing; lookups succeed again.
    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Number of lookups made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HoldingsAdapter for MockHoldings {
    async fn token_balance(&self, wallet: &str) -> Result<f64, TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TallyError::Adapter {
                message: "mock holdings endpoint offline".to_string(),
                source: None,
            });
        }
        Ok(self
            .balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(wallet)
            .copied()
            .unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pricing_returns_configured_price() {
        let pricing = MockPricing::with_price("tally", 0.05);
        assert_eq!(pricing.usd_price("TALLY").await.unwrap(), 0.05);
        assert!(pricing.usd_price("SOL").await.is_err());
        assert_eq!(pricing.calls(), 2);
    }

    #[tokio::test]
    async fn pricing_recovers_after_set_price() {
        let pricing = MockPricing::failing();
        assert!(pricing.usd_price("SOL").await.is_err());
        pricing.set_price("SOL", 50.0);
        assert_eq!(pricing.usd_price("SOL").await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn holdings_toggle_outage_through_clone() {
        let holdings = MockHoldings::with_balance("w1", 10.0);
        let handle = holdings.clone();

        assert_eq!(holdings.token_balance("w1").await.unwrap(), 10.0);
        assert_eq!(holdings.token_balance("unknown").await.unwrap(), 0.0);

        handle.fail();
        assert!(holdings.token_balance("w1").await.is_err());
        handle.recover();
        assert_eq!(holdings.token_balance("w1").await.unwrap(), 10.0);
    }
}

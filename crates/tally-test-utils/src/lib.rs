// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! Provides mock adapters and fixture helpers for fast, deterministic,
//! CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockPricing`] - Scriptable price feed with call counting
//! - [`MockHoldings`] - Scriptable wallet holdings with outage toggling
//! - [`memory_database`] / [`test_billing_config`] / [`test_tier`] - fixtures

pub mod fixtures;
pub mod mock_adapters;

pub use fixtures::{memory_database, test_billing_config, test_tier};
pub use mock_adapters::{MockHoldings, MockPricing};

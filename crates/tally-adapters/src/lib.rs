// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementations of the pricing and holdings adapter traits.
//!
//! Both adapters talk to small JSON collaborators over HTTP with a
//! short request timeout and a single retry on transient errors. The
//! billing layer treats any error from these adapters as an outage and
//! falls back (deposits stay pending, tiers stay cached), so the
//! adapters never need to mask failures themselves.

pub mod holdings;
pub mod pricing;

pub use holdings::HttpHoldingsAdapter;
pub use pricing::HttpPricingAdapter;

use std::time::Duration;

use tally_core::TallyError;

/// Per-request timeout for adapter calls. The billing layer applies its
/// own configurable deadline on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client() -> Result<reqwest::Client, TallyError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| TallyError::Adapter {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

pub(crate) fn is_transient(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for external collaborators.
//!
//! Tally never talks to a chain or price feed directly; it consumes
//! normalized values through these seams. Callers are responsible for
//! wrapping every invocation in a bounded timeout and falling back to
//! cached state on failure.

pub mod holdings;
pub mod pricing;

pub use holdings::HoldingsAdapter;
pub use pricing::PricingAdapter;

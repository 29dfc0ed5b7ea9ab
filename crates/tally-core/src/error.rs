// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally credit ledger service.
//!
//! `TallyError` covers system failures only (storage, adapters, timeouts).
//! Business-rule rejections — insufficient credits, exceeded quotas,
//! replayed deposits — are typed outcomes in [`crate::types`], never
//! errors, so callers can retry system failures without ever retrying a
//! rejection.

use thiserror::Error;

/// The primary error type used across Tally crates.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External adapter errors (price feed or holdings lookup failure).
    #[error("adapter error: {message}")]
    Adapter {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external lookup exceeded its bounded timeout.
    #[error("external lookup timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

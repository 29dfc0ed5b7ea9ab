// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tally credit ledger service.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. All ledger and
//! quota mutations execute as closures on the one background thread,
//! which is what makes per-account conditional updates atomic.

pub mod database;
pub mod migrations;
pub mod models;

pub use database::{map_tr_err, Database};
pub use models::{AccountRow, DepositRow, UsageRow};

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Tally billing service.
//!
//! Exposes the ledger, deposit, usage, and gate operations as a small
//! REST API. All `/v1` routes require bearer auth; `/health` is public
//! for process supervisors.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{start_server, GatewayState, ServerConfig};

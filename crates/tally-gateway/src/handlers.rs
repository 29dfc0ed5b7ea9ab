// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the billing REST API.
//!
//! Business rejections (rate limit, quota, empty balance) are mapped to
//! HTTP status codes but always carry the structured decision body, so
//! clients can show actionable messages without parsing status codes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use tally_core::{AccountId, DepositEvent, DepositOutcome, GateDecision, TallyError};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

fn internal_error(err: TallyError) -> Response {
    tracing::error!(error = %err, "request failed");
    let status = match err {
        TallyError::Timeout { .. } | TallyError::Adapter { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health (public)
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Response body for GET /v1/accounts/{id}/balance.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub free_credits: i64,
    pub paid_credits: i64,
    pub total_credits: i64,
    pub tier: String,
    pub rate_limit_per_minute: u32,
}

/// GET /v1/accounts/{id}/balance
pub async fn get_balance(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.ledger.balance(&AccountId(id)).await {
        Ok(snap) => {
            let rate_limit_per_minute = state
                .tiers
                .iter()
                .find(|t| t.name == snap.tier)
                .or(state.tiers.first())
                .map(|t| t.rate_limit_per_minute)
                .unwrap_or(0);
            Json(BalanceResponse {
                account_id: snap.account_id.0.clone(),
                free_credits: snap.free_credits,
                paid_credits: snap.paid_credits,
                total_credits: snap.total(),
                tier: snap.tier,
                rate_limit_per_minute,
            })
            .into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// Response body for GET /v1/pricing.
#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub price_per_thousand_credits_usd: f64,
    pub reward_token: String,
    pub stable_tokens: Vec<String>,
    pub treasury_address: String,
    pub tiers: Vec<tally_core::TierConfig>,
}

/// GET /v1/pricing
pub async fn get_pricing(State(state): State<GatewayState>) -> Json<PricingResponse> {
    Json(PricingResponse {
        price_per_thousand_credits_usd: state.billing.price_per_thousand_credits_usd,
        reward_token: state.billing.reward_token.clone(),
        stable_tokens: state.billing.stable_tokens.clone(),
        treasury_address: state.billing.treasury_address.clone(),
        tiers: state.tiers.clone(),
    })
}

/// Query parameters for GET /v1/accounts/{id}/usage.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Maximum number of recent entries to return (ignored when a time
    /// window is given).
    #[serde(default = "default_usage_limit")]
    pub limit: u32,
    /// Inclusive ISO 8601 window start.
    #[serde(default)]
    pub from: Option<String>,
    /// Inclusive ISO 8601 window end.
    #[serde(default)]
    pub to: Option<String>,
}

fn default_usage_limit() -> u32 {
    50
}

/// One deposit in the billing-history response.
#[derive(Debug, Serialize)]
pub struct DepositEntry {
    pub deposit_id: String,
    pub token: String,
    pub amount: f64,
    pub usd_value: Option<f64>,
    pub credits_granted: Option<i64>,
    pub bonus_applied: f64,
    pub status: String,
    pub confirmed_at: String,
}

/// Response body for GET /v1/accounts/{id}/usage.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub summary: tally_billing::UsageSummary,
    pub recent_calls: Vec<tally_core::UsageRecord>,
    pub deposits: Vec<DepositEntry>,
}

/// GET /v1/accounts/{id}/usage
///
/// Billing-history view: lifetime totals, recent gated calls, and the
/// account's deposits.
pub async fn get_usage(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let account = AccountId(id);
    let summary = match state.usage.summary(&account).await {
        Ok(s) => s,
        Err(err) => return internal_error(err),
    };
    let recent_calls = match (&query.from, &query.to) {
        (Some(from), to) => {
            let to = to.as_deref().unwrap_or("9999-12-31T23:59:59.999Z");
            state.usage.range(&account, from, to).await
        }
        (None, Some(to)) => {
            state
                .usage
                .range(&account, "0000-01-01T00:00:00.000Z", to)
                .await
        }
        (None, None) => state.usage.recent(&account, query.limit).await,
    };
    let recent_calls = match recent_calls {
        Ok(rows) => rows,
        Err(err) => return internal_error(err),
    };
    match state.deposits.list_for_account(&account, query.limit).await {
        Ok(rows) => {
            let deposits = rows
                .into_iter()
                .map(|row| DepositEntry {
                    deposit_id: row.id,
                    token: row.token,
                    amount: row.amount,
                    usd_value: row.usd_value,
                    credits_granted: row.credits_granted,
                    bonus_applied: row.bonus_applied,
                    status: row.status,
                    confirmed_at: row.confirmed_at,
                })
                .collect();
            Json(UsageResponse {
                summary,
                recent_calls,
                deposits,
            })
            .into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// Request body for POST /v1/accounts/{id}/usage.
#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub endpoint: String,
    pub method: String,
    #[serde(default = "default_cost")]
    pub credits_consumed: i64,
}

/// POST /v1/accounts/{id}/usage
pub async fn post_usage(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<RecordUsageRequest>,
) -> Response {
    match state
        .usage
        .append(
            &AccountId(id),
            &body.endpoint,
            &body.method,
            body.credits_consumed,
        )
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => internal_error(err),
    }
}

/// Response body for POST /v1/deposits.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DepositResponse {
    Credited {
        credits: i64,
        usd_value: f64,
        bonus_applied: f64,
    },
    AlreadyProcessed,
    Rejected {
        reason: String,
    },
}

/// POST /v1/deposits
///
/// Idempotent: replaying a deposit event returns `already_processed`
/// with 200. A price feed outage returns 503 and leaves the deposit
/// pending for the retry loop; a malformed amount returns 400 and is
/// not recorded.
pub async fn post_deposits(
    State(state): State<GatewayState>,
    Json(event): Json<DepositEvent>,
) -> Response {
    match state.deposits.process(&event).await {
        Ok(DepositOutcome::Credited {
            credits,
            usd_value,
            bonus_applied,
        }) => Json(DepositResponse::Credited {
            credits,
            usd_value,
            bonus_applied,
        })
        .into_response(),
        Ok(DepositOutcome::AlreadyProcessed) => {
            Json(DepositResponse::AlreadyProcessed).into_response()
        }
        Ok(DepositOutcome::Rejected { reason }) => (
            StatusCode::BAD_REQUEST,
            Json(DepositResponse::Rejected { reason }),
        )
            .into_response(),
        Ok(DepositOutcome::PricingUnavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "price feed unavailable; deposit recorded and will be retried".to_string(),
            }),
        )
            .into_response(),
        Err(err) => internal_error(err),
    }
}

/// Request body for POST /v1/accounts/{id}/gate.
#[derive(Debug, Deserialize)]
pub struct GateRequest {
    /// Logical endpoint being billed.
    pub endpoint: String,
    /// HTTP method or operation verb.
    #[serde(default = "default_method")]
    pub method: String,
    /// Credit cost of the call.
    #[serde(default = "default_cost")]
    pub cost: i64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_cost() -> i64 {
    1
}

/// HTTP status for a gate decision.
pub(crate) fn decision_status(decision: &GateDecision) -> StatusCode {
    match decision {
        GateDecision::Allowed { .. } => StatusCode::OK,
        GateDecision::RateLimited { .. } | GateDecision::QuotaExceeded { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        GateDecision::CreditsExhausted { .. } => StatusCode::PAYMENT_REQUIRED,
    }
}

/// POST /v1/accounts/{id}/gate
///
/// On `Allowed` the quota slot and credits are consumed and the call is
/// written to the usage log before responding.
pub async fn post_gate(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<GateRequest>,
) -> Response {
    let account = AccountId(id);
    match state.gate.check(&account, body.cost).await {
        Ok(decision) => {
            if matches!(decision, GateDecision::Allowed { .. }) {
                state
                    .gate
                    .settle(&account, &body.endpoint, &body.method, body.cost)
                    .await;
            }
            (decision_status(&decision), Json(decision)).into_response()
        }
        Err(err) => internal_error(err),
    }
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP wallet holdings adapter.
//!
//! Expects a collaborator exposing `GET {base}/holdings/{wallet}`
//! returning `{"balance": <f64>}` in reward-token units. Transient
//! errors (429, 5xx) are retried once after a short delay.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tally_core::{HoldingsAdapter, TallyError};
use tracing::{debug, warn};

use crate::{build_client, is_transient};

#[derive(Debug, Deserialize)]
struct HoldingsResponse {
    balance: f64,
}

/// Holdings lookup client for tier resolution.
#[derive(Debug, Clone)]
pub struct HttpHoldingsAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHoldingsAdapter {
    pub fn new(base_url: String) -> Result<Self, TallyError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HoldingsAdapter for HttpHoldingsAdapter {
    async fn token_balance(&self, wallet: &str) -> Result<f64, TallyError> {
        let url = format!("{}/holdings/{}", self.base_url, wallet);
        let mut last_status = None;

        for attempt in 0..=1u32 {
            if attempt > 0 {
                warn!(wallet, attempt, "retrying holdings lookup after transient error");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| TallyError::Adapter {
                    message: format!("holdings request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            if status.is_success() {
                let body: HoldingsResponse =
                    response.json().await.map_err(|e| TallyError::Adapter {
                        message: format!("malformed holdings response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                debug!(wallet, balance = body.balance, "holdings resolved");
                return Ok(body.balance);
            }

            if is_transient(status) && attempt == 0 {
                last_status = Some(status);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(TallyError::Adapter {
                message: format!("holdings endpoint returned {status}: {body}"),
                source: None,
            });
        }

        Err(TallyError::Adapter {
            message: format!(
                "holdings endpoint unavailable after retry (last status {:?})",
                last_status
            ),
            source: None,
        })
    }
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP price feed adapter.
//!
//! Expects a collaborator exposing `GET {base}/price/{token}` returning
//! `{"usd_price": <f64>}`. Transient errors (429, 5xx) are retried once
//! after a short delay.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tally_core::{PricingAdapter, TallyError};
use tracing::{debug, warn};

use crate::{build_client, is_transient};

#[derive(Debug, Deserialize)]
struct PriceResponse {
    usd_price: f64,
}

/// Price feed client for non-stable tokens.
#[derive(Debug, Clone)]
pub struct HttpPricingAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPricingAdapter {
    pub fn new(base_url: String) -> Result<Self, TallyError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PricingAdapter for HttpPricingAdapter {
    async fn usd_price(&self, token: &str) -> Result<f64, TallyError> {
        let url = format!("{}/price/{}", self.base_url, token);
        let mut last_status = None;

        for attempt in 0..=1u32 {
            if attempt > 0 {
                warn!(token, attempt, "retrying price lookup after transient error");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| TallyError::Adapter {
                    message: format!("price request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            if status.is_success() {
                let body: PriceResponse =
                    response.json().await.map_err(|e| TallyError::Adapter {
                        message: format!("malformed price response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                debug!(token, price = body.usd_price, "price resolved");
                return Ok(body.usd_price);
            }

            if is_transient(status) && attempt == 0 {
                last_status = Some(status);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(TallyError::Adapter {
                message: format!("price feed returned {status}: {body}"),
                source: None,
            });
        }

        Err(TallyError::Adapter {
            message: format!(
                "price feed unavailable after retry (last status {:?})",
                last_status
            ),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_price_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/SOL"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"usd_price": 48.5})),
            )
            .mount(&server)
            .await;

        let adapter = HttpPricingAdapter::new(server.uri()).unwrap();
        assert_eq!(adapter.usd_price("SOL").await.unwrap(), 48.5);
    }

    #[tokio::test]
    async fn retries_once_on_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/SOL"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/price/SOL"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"usd_price": 50.0})),
            )
            .mount(&server)
            .await;

        let adapter = HttpPricingAdapter::new(server.uri()).unwrap();
        assert_eq!(adapter.usd_price("SOL").await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = HttpPricingAdapter::new(server.uri()).unwrap();
        assert!(adapter.usd_price("NOPE").await.is_err());
    }
}

// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally status` command implementation.
//!
//! Queries the gateway health endpoint and prints service state.
//! Falls back gracefully when the service is not running.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_config::model::TallyConfig;
use tally_core::TallyError;

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub gateway_host: String,
    pub gateway_port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `tally status` command.
pub async fn run_status(config: &TallyConfig, json: bool) -> Result<(), TallyError> {
    let host = &config.gateway.host;
    let port = config.gateway.port;
    let url = format!("http://{host}:{port}/health");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| TallyError::Internal(format!("failed to build HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            response.json::<HealthResponse>().await.ok()
        }
        _ => None,
    };

    let status = match &health {
        Some(h) => StatusResponse {
            running: true,
            status: h.status.clone(),
            version: Some(h.version.clone()),
            uptime_secs: Some(h.uptime_secs),
            gateway_host: host.clone(),
            gateway_port: port,
        },
        None => StatusResponse {
            running: false,
            status: "not running".to_string(),
            version: None,
            uptime_secs: None,
            gateway_host: host.clone(),
            gateway_port: port,
        },
    };

    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| TallyError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if status.running {
        println!("tally is running ({})", status.status);
        if let Some(version) = &status.version {
            println!("  version: {version}");
        }
        if let Some(secs) = status.uptime_secs {
            println!("  uptime:  {}", format_uptime(secs));
        }
        println!("  gateway: {host}:{port}");
    } else {
        println!("tally is not running (no gateway at {host}:{port})");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_by_magnitude() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3660), "1h 1m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }

    #[tokio::test]
    async fn status_handles_unreachable_gateway() {
        let mut config = TallyConfig::default();
        // A port nothing listens on.
        config.gateway.port = 1;
        run_status(&config, true).await.unwrap();
    }
}

//! Readiness polling for the inference server

use crate::error::{GgufError, GgufResult};
use async_trait::async_trait;
use std::io::Write;
use tokio::time::{Duration, sleep};

/// Unanswered checks between progress dots
const PROGRESS_EVERY: u32 = 10;

/// A single "is the server up" check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

/// `GET {base_url}/health` answering with a success status
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str) -> GgufResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            url: format!("{}/health", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(error = %e, "Health check not answered");
                false
            }
        }
    }
}

/// Poll `probe` once per `tick` until it reports healthy
///
/// Returns the number of checks made, the successful one included. Fails with
/// [`GgufError::Timeout`] after `max_ticks` unanswered checks.
pub async fn wait_for_ready(
    probe: &dyn HealthProbe,
    max_ticks: u32,
    tick: Duration,
) -> GgufResult<u32> {
    tracing::info!(max_ticks = max_ticks, "Waiting for server to be ready");

    for attempt in 1..=max_ticks {
        if probe.is_healthy().await {
            if attempt > PROGRESS_EVERY {
                eprintln!();
            }
            tracing::info!(checks = attempt, "Server is ready");
            return Ok(attempt);
        }

        if attempt % PROGRESS_EVERY == 0 {
            eprint!(".");
            let _ = std::io::stderr().flush();
            tracing::info!(checks = attempt, "Server still loading");
        }

        if attempt < max_ticks {
            sleep(tick).await;
        }
    }

    Err(GgufError::Timeout {
        secs: (tick * max_ticks).as_secs(),
    })
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::mocks::MockProbe;
    use super::*;

    #[tokio::test]
    async fn test_ready_on_fifth_check() {
        let probe = MockProbe::healthy_on(5);
        let ticks = wait_for_ready(&probe, 300, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(ticks, 5);
        assert_eq!(probe.checks(), 5);
    }

    #[tokio::test]
    async fn test_immediately_ready() {
        let probe = MockProbe::healthy_on(1);
        let ticks = wait_for_ready(&probe, 300, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(ticks, 1);
    }

    #[tokio::test]
    async fn test_timeout_after_max_ticks() {
        let probe = MockProbe::never();
        let err = wait_for_ready(&probe, 300, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, GgufError::Timeout { .. }));
        assert_eq!(probe.checks(), 300);
    }

    #[tokio::test]
    async fn test_ready_after_budget_is_not_seen() {
        let probe = MockProbe::healthy_on(301);
        assert!(wait_for_ready(&probe, 300, Duration::ZERO).await.is_err());
        assert_eq!(probe.checks(), 300);
    }

    #[tokio::test]
    async fn test_http_probe_unreachable() {
        // Port 9 (discard) is almost never bound locally
        let probe = HttpHealthProbe::new("http://127.0.0.1:9/").unwrap();
        assert_eq!(probe.url, "http://127.0.0.1:9/health");
        assert!(!probe.is_healthy().await);
    }
}

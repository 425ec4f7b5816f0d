//! Report delivery.
//!
//! The reporter treats every transmitter error as retryable within its
//! bounded send backoff.

use std::fmt;

use async_trait::async_trait;
use beacon_model::ClusterSeed;
use chrono::{DateTime, Utc};

use crate::error::Result;

#[async_trait]
pub trait Transmitter: Send + Sync + fmt::Debug {
    /// Deliver the report for the schedule slot `interval`.
    async fn send(&self, seed: &ClusterSeed, interval: DateTime<Utc>) -> Result<()>;
}

#[cfg(feature = "http")]
pub use http::HttpTransmitter;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use beacon_model::{ClusterSeed, UsageReport};
    use chrono::{DateTime, Utc};
    use tracing::debug;
    use url::Url;

    use super::Transmitter;
    use crate::error::{BeaconError, Result};

    /// Posts a JSON [`UsageReport`] to a fixed endpoint.
    #[derive(Debug, Clone)]
    pub struct HttpTransmitter {
        client: reqwest::Client,
        endpoint: Url,
        period: Duration,
    }

    impl HttpTransmitter {
        pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

        /// `period` is the report interval announced in each report.
        pub fn new(endpoint: Url, period: Duration, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| {
                    BeaconError::InvalidConfig(format!("failed to build HTTP client: {e}"))
                })?;
            Ok(Self {
                client,
                endpoint,
                period,
            })
        }

        pub fn endpoint(&self) -> &Url {
            &self.endpoint
        }
    }

    #[async_trait]
    impl Transmitter for HttpTransmitter {
        async fn send(&self, seed: &ClusterSeed, interval: DateTime<Utc>) -> Result<()> {
            let report = UsageReport::new(seed, interval, self.period);
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&report)
                .send()
                .await
                .map_err(|e| BeaconError::Transmit(format!("POST {} failed: {e}", self.endpoint)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BeaconError::Transmit(format!(
                    "POST {} returned {status}: {}",
                    self.endpoint,
                    body.chars().take(256).collect::<String>()
                )));
            }
            debug!(target: "usage::report", %interval, status = status.as_u16(), "usage report accepted");
            Ok(())
        }
    }
}

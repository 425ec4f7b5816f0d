use beacon_core::BeaconError;
use thiserror::Error;
use url::Url;

use crate::models::{AgentConfig, BlobBackend, CoordinationBackend};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("usage_report: {0}")]
    Reporter(#[source] BeaconError),

    #[error("transmitter.endpoint must be set unless usage reporting is disabled")]
    MissingEndpoint,

    #[error("transmitter.endpoint {0} must use http or https")]
    UnsupportedScheme(Url),

    #[error("transmitter.timeout must be greater than zero")]
    ZeroTimeout,

    #[error("coordination.url {url} is not a redis URL: {reason}")]
    InvalidRedisUrl { url: String, reason: String },

    #[error("blob.root must not be empty")]
    EmptyCacheRoot,
}

/// Check `config` against what the reporter needs to run.
///
/// A disabled configuration always passes; nothing it names is used.
pub fn validate(config: &AgentConfig) -> Result<(), ConfigGuardRailError> {
    if config.is_disabled() {
        return Ok(());
    }

    config
        .usage_report
        .validate()
        .map_err(ConfigGuardRailError::Reporter)?;

    let endpoint = config
        .transmitter
        .endpoint
        .as_ref()
        .ok_or(ConfigGuardRailError::MissingEndpoint)?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ConfigGuardRailError::UnsupportedScheme(endpoint.clone()));
    }
    if config.transmitter.timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroTimeout);
    }

    if let CoordinationBackend::Redis { url } = &config.coordination {
        let parsed = Url::parse(url).map_err(|err| ConfigGuardRailError::InvalidRedisUrl {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
            return Err(ConfigGuardRailError::InvalidRedisUrl {
                url: url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
    }

    if let BlobBackend::Cacache { root } = &config.blob
        && root.as_os_str().is_empty()
    {
        return Err(ConfigGuardRailError::EmptyCacheRoot);
    }

    Ok(())
}

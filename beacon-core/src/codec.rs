//! Stable, versionless serialization of [`ClusterSeed`].
//!
//! The same codec encodes the election key value and the published blob.

use beacon_model::ClusterSeed;

use crate::error::{BeaconError, Result};

pub trait SeedCodec: Send + Sync + std::fmt::Debug {
    fn encode(&self, seed: &ClusterSeed) -> Result<Vec<u8>>;

    /// Any failure here is reported as [`BeaconError::Corrupt`].
    fn decode(&self, bytes: &[u8]) -> Result<ClusterSeed>;
}

/// JSON encoding: `{"UID": .., "version": .., "created_at": ..}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SeedCodec for JsonCodec {
    fn encode(&self, seed: &ClusterSeed) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(seed)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ClusterSeed> {
        let seed: ClusterSeed = serde_json::from_slice(bytes).map_err(|e| {
            BeaconError::Corrupt(format!("cluster seed decode failed: {e}"))
        })?;
        if seed.uid.as_str().is_empty() {
            return Err(BeaconError::Corrupt("cluster seed has an empty UID".into()));
        }
        Ok(seed)
    }
}

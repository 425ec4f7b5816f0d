//! Seed store adapter.
//!
//! Narrows the generic coordination and blob stores down to the handful of
//! operations the coordinator needs: one compare-and-swap against the
//! election key, and read/write/delete of the published seed blob.

use std::sync::Arc;

use beacon_model::ClusterSeed;
use tracing::{debug, trace};

use crate::{
    codec::{JsonCodec, SeedCodec},
    error::{BeaconError, Result},
    store::{BlobStore, CasDecision, CoordinationStore},
};

/// Key in the coordination store that names the elected seed.
pub const DEFAULT_ELECTION_KEY: &str = "usagestats_token";
/// Blob path holding the published seed.
pub const DEFAULT_SEED_PATH: &str = "usage_cluster_seed.json";

/// Decoded view of the value currently held under the election key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionRecord {
    Absent,
    Seed(ClusterSeed),
    /// Something other than a seed. It cannot be a committed identity, so a
    /// candidate may replace it.
    Foreign(Vec<u8>),
}

impl ElectionRecord {
    pub fn decode(raw: Option<&[u8]>, codec: &dyn SeedCodec) -> Self {
        match raw {
            None => ElectionRecord::Absent,
            Some(bytes) => match codec.decode(bytes) {
                Ok(seed) => ElectionRecord::Seed(seed),
                Err(_) => ElectionRecord::Foreign(bytes.to_vec()),
            },
        }
    }
}

/// Result of one [`SeedStore::elect_or_adopt`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    /// The seed the election key now references.
    pub seed: ClusterSeed,
    /// Whether the key references the caller's candidate.
    pub elected: bool,
}

/// Store adapter used by the coordinator.
#[derive(Debug, Clone)]
pub struct SeedStore {
    coordination: Arc<dyn CoordinationStore>,
    blobs: Arc<dyn BlobStore>,
    codec: Arc<dyn SeedCodec>,
    election_key: String,
    seed_path: String,
}

impl SeedStore {
    pub fn new(
        coordination: Arc<dyn CoordinationStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            coordination,
            blobs,
            codec: Arc::new(JsonCodec),
            election_key: DEFAULT_ELECTION_KEY.to_string(),
            seed_path: DEFAULT_SEED_PATH.to_string(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn SeedCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_election_key(mut self, key: impl Into<String>) -> Self {
        self.election_key = key.into();
        self
    }

    pub fn with_seed_path(mut self, path: impl Into<String>) -> Self {
        self.seed_path = path.into();
        self
    }

    pub fn election_key(&self) -> &str {
        &self.election_key
    }

    pub fn seed_path(&self) -> &str {
        &self.seed_path
    }

    /// Propose `candidate` under the election key with a single CAS.
    ///
    /// - key absent (or holding a non-seed): store the candidate, elected.
    /// - key holds the candidate's uid: no write, elected. Re-issuing after
    ///   a partially successful attempt is therefore safe.
    /// - key holds another uid: no write, not elected, that seed returned.
    pub async fn elect_or_adopt(&self, candidate: &ClusterSeed) -> Result<Election> {
        let encoded = self.codec.encode(candidate)?;
        let codec = Arc::clone(&self.codec);
        let mut outcome: Option<Election> = None;

        let mut decide = |current: Option<&[u8]>| -> Result<CasDecision> {
            match ElectionRecord::decode(current, codec.as_ref()) {
                ElectionRecord::Absent | ElectionRecord::Foreign(_) => {
                    outcome = Some(Election {
                        seed: candidate.clone(),
                        elected: true,
                    });
                    Ok(CasDecision::Put(encoded.clone()))
                }
                ElectionRecord::Seed(stored) => {
                    let elected = stored.same_cluster(candidate);
                    outcome = Some(Election {
                        seed: stored,
                        elected,
                    });
                    Ok(CasDecision::Keep)
                }
            }
        };
        self.coordination
            .compare_and_swap(&self.election_key, &mut decide)
            .await
            .map_err(|e| match e {
                BeaconError::StoreUnavailable(_) => e,
                other => BeaconError::StoreUnavailable(other.to_string()),
            })?;

        let election = outcome.ok_or_else(|| {
            BeaconError::StoreUnavailable(format!(
                "compare-and-swap on {} returned without consulting the stored value",
                self.election_key
            ))
        })?;
        trace!(
            target: "usage::seed",
            uid = %election.seed.uid,
            elected = election.elected,
            "election key resolved"
        );
        Ok(election)
    }

    /// Read the published seed.
    ///
    /// Fails with `NotFound` when no leader has published yet, `Corrupt`
    /// when the blob does not decode, and `Io` for anything else.
    pub async fn read_persisted_seed(&self) -> Result<ClusterSeed> {
        let bytes = self.blobs.get(&self.seed_path).await.map_err(|e| match e {
            BeaconError::NotFound(_) | BeaconError::Corrupt(_) | BeaconError::Io(_) => e,
            other => BeaconError::Io(other.to_string()),
        })?;
        self.codec.decode(&bytes)
    }

    pub async fn write_persisted_seed(&self, seed: &ClusterSeed) -> Result<()> {
        let bytes = self.codec.encode(seed)?;
        self.blobs.put(&self.seed_path, &bytes).await?;
        debug!(target: "usage::seed", uid = %seed.uid, path = %self.seed_path, "published cluster seed");
        Ok(())
    }

    pub async fn delete_persisted_seed(&self) -> Result<()> {
        self.blobs.delete(&self.seed_path).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use beacon_model::ClusterSeed;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::{MemoryBlobStore, MemoryCoordinationStore};

    fn seed(uid: &str) -> ClusterSeed {
        ClusterSeed::new(uid, "test", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn adapter() -> (SeedStore, Arc<MemoryCoordinationStore>, Arc<MemoryBlobStore>) {
        let kv = Arc::new(MemoryCoordinationStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = SeedStore::new(kv.clone(), blobs.clone());
        (store, kv, blobs)
    }

    #[tokio::test]
    async fn first_candidate_is_elected() {
        let (store, kv, _) = adapter();
        let election = store.elect_or_adopt(&seed("abc")).await.unwrap();
        assert!(election.elected);
        assert_eq!(election.seed.uid.as_str(), "abc");
        assert_eq!(kv.writes(), 1);
    }

    #[tokio::test]
    async fn later_candidate_adopts_stored_seed() {
        let (store, kv, _) = adapter();
        store.elect_or_adopt(&seed("abc")).await.unwrap();

        let election = store.elect_or_adopt(&seed("xyz")).await.unwrap();
        assert!(!election.elected);
        assert_eq!(election.seed, seed("abc"));
        assert_eq!(kv.writes(), 1, "losing candidate must not write");
    }

    #[tokio::test]
    async fn re_electing_same_uid_is_idempotent() {
        let (store, kv, _) = adapter();
        let first = store.elect_or_adopt(&seed("abc")).await.unwrap();
        let second = store.elect_or_adopt(&seed("abc")).await.unwrap();
        let third = store.elect_or_adopt(&seed("abc")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(kv.writes(), 1);
    }

    #[tokio::test]
    async fn foreign_value_is_replaced() {
        let (store, kv, _) = adapter();
        kv.set(store.election_key(), b"\x00not a seed".to_vec()).await;

        let election = store.elect_or_adopt(&seed("abc")).await.unwrap();
        assert!(election.elected);
        let raw = kv.get(store.election_key()).await.unwrap();
        assert_eq!(JsonCodec.decode(&raw).unwrap().uid.as_str(), "abc");
    }

    #[tokio::test]
    async fn cas_failure_is_store_unavailable() {
        let (store, kv, _) = adapter();
        kv.fail_next(1);
        let err = store.elect_or_adopt(&seed("abc")).await.unwrap_err();
        assert!(matches!(err, BeaconError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn persisted_seed_errors_are_classified() {
        let (store, _, blobs) = adapter();
        assert!(store.read_persisted_seed().await.unwrap_err().is_not_found());

        blobs.insert_raw(store.seed_path(), "garbage").await;
        assert!(store.read_persisted_seed().await.unwrap_err().is_corrupt());

        blobs.fail_gets(1);
        assert!(matches!(
            store.read_persisted_seed().await.unwrap_err(),
            BeaconError::Io(_)
        ));

        store.write_persisted_seed(&seed("abc")).await.unwrap();
        assert_eq!(store.read_persisted_seed().await.unwrap(), seed("abc"));

        store.delete_persisted_seed().await.unwrap();
        assert!(store.read_persisted_seed().await.unwrap_err().is_not_found());
    }
}

//! Shared fixtures for core integration tests.
#![allow(dead_code)]

use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use beacon_core::{
    BackoffConfig, BeaconError, ClusterSeed, CoordinatorConfig, JsonCodec, ReporterConfig,
    Result, Role, SeedCodec, SeedCoordinator, SeedStore, Transmitter,
    store::{MemoryBlobStore, MemoryCoordinationStore},
};
use chrono::{DateTime, TimeZone, Utc};

pub const SEED_PATH: &str = beacon_core::seed_store::DEFAULT_SEED_PATH;
pub const ELECTION_KEY: &str = beacon_core::seed_store::DEFAULT_ELECTION_KEY;

/// Upper bound for any wait in these tests.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 21, 45).unwrap()
}

pub fn fast_unbounded() -> BackoffConfig {
    BackoffConfig {
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        max_retries: 0,
    }
}

pub fn fast_send() -> BackoffConfig {
    BackoffConfig {
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        max_retries: 5,
    }
}

pub fn coordinator_config(role: Role) -> CoordinatorConfig {
    CoordinatorConfig {
        role,
        version: "test".into(),
        election_backoff: fast_unbounded(),
        fetch_backoff: fast_unbounded(),
        corruption_threshold: 4,
    }
}

pub fn reporter_config(role: Role) -> ReporterConfig {
    ReporterConfig {
        role,
        election_backoff: fast_unbounded(),
        fetch_backoff: fast_unbounded(),
        send_backoff: fast_send(),
        version: "test".into(),
        ..ReporterConfig::default()
    }
}

pub struct Cluster {
    pub kv: Arc<MemoryCoordinationStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            kv: Arc::new(MemoryCoordinationStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
        }
    }

    pub fn seed_store(&self) -> SeedStore {
        SeedStore::new(self.kv.clone(), self.blobs.clone())
    }

    pub fn coordinator(&self, role: Role) -> SeedCoordinator {
        SeedCoordinator::new(self.seed_store(), coordinator_config(role))
    }

    /// Publish `seed` under both the election key and the blob path.
    pub async fn publish(&self, seed: &ClusterSeed) {
        let bytes = JsonCodec.encode(seed).unwrap();
        self.kv.set(ELECTION_KEY, bytes.clone()).await;
        self.blobs.insert_raw(SEED_PATH, bytes).await;
    }

    pub async fn published(&self) -> Option<ClusterSeed> {
        let bytes = self.blobs.contents(SEED_PATH).await?;
        Some(JsonCodec.decode(&bytes).unwrap())
    }

    pub async fn elected(&self) -> Option<ClusterSeed> {
        let bytes = self.kv.get(ELECTION_KEY).await?;
        Some(JsonCodec.decode(&bytes).unwrap())
    }
}

/// Transmitter that fails a configurable number of calls, then records
/// every delivered slot.
#[derive(Debug, Default)]
pub struct RecordingTransmitter {
    failures: AtomicU32,
    calls: AtomicU32,
    delivered: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<DateTime<Utc>> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transmitter for RecordingTransmitter {
    async fn send(&self, _seed: &ClusterSeed, interval: DateTime<Utc>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BeaconError::Transmit("endpoint unreachable".into()));
        }
        self.delivered.lock().unwrap().push(interval);
        Ok(())
    }
}

/// Poll `condition` every millisecond until it holds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(PATIENCE, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

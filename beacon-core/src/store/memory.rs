//! Deterministic in-process stores.
//!
//! Used by tests and by single-process deployments that have no shared
//! backend. Both stores can be told to fail their next operations so retry
//! paths can be exercised.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use super::{BlobStore, CasDecision, CasUpdate, CoordinationStore};
use crate::error::{BeaconError, Result};

/// Pending injected failures; each operation consumes one.
#[derive(Debug, Default)]
struct Faults(AtomicU32);

impl Faults {
    fn arm(&self, count: u32) {
        self.0.store(count, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory coordination store whose CAS holds a lock across the callback.
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
    faults: Faults,
    cas_calls: AtomicU64,
    writes: AtomicU64,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` CAS calls fail with `StoreUnavailable`.
    pub fn fail_next(&self, count: u32) {
        self.faults.arm(count);
    }

    pub fn cas_calls(&self) -> u64 {
        self.cas_calls.load(Ordering::SeqCst)
    }

    /// Number of CAS calls that stored a value.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: Vec<u8>) {
        self.values.lock().await.insert(key.to_string(), value);
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn compare_and_swap(&self, key: &str, update: &mut CasUpdate<'_>) -> Result<()> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.take() {
            return Err(BeaconError::StoreUnavailable(format!(
                "injected failure for CAS on {key}"
            )));
        }

        let mut values = self.values.lock().await;
        let current = values.get(key).map(Vec::as_slice);
        match update(current)? {
            CasDecision::Put(next) => {
                trace!(target: "usage::store", key, bytes = next.len(), "memory CAS put");
                values.insert(key.to_string(), next);
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            CasDecision::Keep => {
                trace!(target: "usage::store", key, "memory CAS keep");
            }
        }
        Ok(())
    }
}

/// In-memory blob store with per-operation counters.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    get_faults: Faults,
    put_faults: Faults,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` reads fail with an I/O error.
    pub fn fail_gets(&self, count: u32) {
        self.get_faults.arm(count);
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_puts(&self, count: u32) {
        self.put_faults.arm(count);
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Store raw bytes, bypassing any codec.
    pub async fn insert_raw(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .await
            .insert(path.to_string(), bytes.into());
    }

    pub async fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.get_faults.take() {
            return Err(BeaconError::Io(format!("injected read failure: {path}")));
        }
        self.objects
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BeaconError::NotFound(format!("object not found: {path}")))
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.put_faults.take() {
            return Err(BeaconError::Io(format!("injected write failure: {path}")));
        }
        self.objects
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cas_keep_leaves_value_alone() {
        let store = MemoryCoordinationStore::new();
        store.set("k", b"old".to_vec()).await;

        store
            .compare_and_swap("k", &mut |current: Option<&[u8]>| -> Result<CasDecision> {
                assert_eq!(current, Some(&b"old"[..]));
                Ok(CasDecision::Keep)
            })
            .await
            .unwrap();

        assert_eq!(store.get("k").await.as_deref(), Some(&b"old"[..]));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let store = MemoryCoordinationStore::new();
        store.fail_next(2);

        let mut put = |_: Option<&[u8]>| -> Result<CasDecision> {
            Ok(CasDecision::Put(b"v".to_vec()))
        };
        assert!(store.compare_and_swap("k", &mut put).await.is_err());
        assert!(store.compare_and_swap("k", &mut put).await.is_err());
        assert!(store.compare_and_swap("k", &mut put).await.is_ok());
        assert_eq!(store.cas_calls(), 3);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let blobs = MemoryBlobStore::new();
        let err = blobs.get("seed.json").await.unwrap_err();
        assert!(err.is_not_found());

        blobs.put("seed.json", b"{}").await.unwrap();
        assert_eq!(blobs.get("seed.json").await.unwrap(), b"{}");
        blobs.delete("seed.json").await.unwrap();
        assert!(blobs.get("seed.json").await.unwrap_err().is_not_found());
        assert_eq!(blobs.deletes(), 1);
    }
}

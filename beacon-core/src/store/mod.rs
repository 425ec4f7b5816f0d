//! Narrow contracts for the two external, shared stores.
//!
//! The coordination store provides an atomic read-modify-write on a key; the
//! blob store holds the published seed under a fixed path. Atomicity and
//! durability are delegated entirely to the backends.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

#[cfg(feature = "cacache")]
pub mod cacache;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "cacache")]
pub use self::cacache::CacacheBlobStore;
pub use self::memory::{MemoryBlobStore, MemoryCoordinationStore};
#[cfg(feature = "redis")]
pub use self::redis::RedisCoordinationStore;

/// What a compare-and-swap callback wants done with the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasDecision {
    /// Store this value. The store re-runs the callback if another writer
    /// raced it.
    Put(Vec<u8>),
    /// Leave the stored value untouched and stop.
    Keep,
}

/// Callback handed the current raw value (`None` when absent).
pub type CasUpdate<'a> =
    dyn FnMut(Option<&[u8]>) -> Result<CasDecision> + Send + 'a;

#[async_trait]
pub trait CoordinationStore: Send + Sync + fmt::Debug {
    /// Atomically read `key`, hand it to `update`, and apply the decision.
    ///
    /// `update` may be invoked several times when the backend detects a
    /// concurrent writer. An error returned by `update` aborts the swap and
    /// is passed through unchanged; backend failures surface as
    /// [`crate::error::BeaconError::StoreUnavailable`].
    async fn compare_and_swap(&self, key: &str, update: &mut CasUpdate<'_>) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Fails with [`crate::error::BeaconError::NotFound`] when nothing is
    /// stored at `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Removing a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

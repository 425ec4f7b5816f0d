use std::{
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::debug;

use super::BlobStore;
use crate::error::{BeaconError, Result};

/// Root directory for the seed blob store.
///
/// This is a dedicated directory that `cacache` manages internally
/// (index + content-addressed blobs). Point every process of a cluster at
/// the same shared volume.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SeedCacheRoot(PathBuf);

impl SeedCacheRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for SeedCacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SeedCacheRoot").field(&self.0).finish()
    }
}

/// A thin wrapper over `cacache` keyed by blob path.
#[derive(Clone, Debug)]
pub struct CacacheBlobStore {
    root: SeedCacheRoot,
}

impl CacacheBlobStore {
    pub fn new(root: SeedCacheRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SeedCacheRoot {
        &self.root
    }
}

fn map_read_error(path: &str, e: cacache::Error) -> BeaconError {
    match e {
        cacache::Error::EntryNotFound(_, _) => {
            BeaconError::NotFound(format!("cache entry not found: {path}"))
        }
        cacache::Error::IntegrityError(err) => BeaconError::Corrupt(format!(
            "cache entry failed integrity check: {path} ({err})"
        )),
        cacache::Error::SizeMismatch(wanted, actual) => BeaconError::Corrupt(format!(
            "cache entry size mismatch: key={path}, wanted={wanted}, actual={actual}"
        )),
        cacache::Error::IoError(_, msg) => {
            BeaconError::Io(format!("cacache read I/O error: {msg}"))
        }
        cacache::Error::SerdeError(_, msg) => {
            BeaconError::Io(format!("cacache read serde error: {msg}"))
        }
    }
}

#[async_trait]
impl BlobStore for CacacheBlobStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        cacache::read(self.root.as_path(), path)
            .await
            .map_err(|e| map_read_error(path, e))
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let integrity = cacache::write(self.root.as_path(), path, bytes)
            .await
            .map_err(|e| BeaconError::Io(format!("cacache write failed: {e}")))?;
        debug!(target: "usage::store", path, %integrity, bytes = bytes.len(), "wrote blob");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let meta = cacache::metadata(self.root.as_path(), path)
            .await
            .map_err(|e| BeaconError::Io(format!("cacache metadata failed: {e}")))?;
        if meta.is_none() {
            return Ok(());
        }

        let r_opts = cacache::index::RemoveOpts::new().remove_fully(true);
        r_opts
            .remove(self.root.as_path(), path)
            .await
            .map_err(|e| BeaconError::Io(format!("cacache remove failed: {e}")))
    }
}

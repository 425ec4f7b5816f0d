use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    /// The coordination store (or its compare-and-swap primitive) failed.
    #[error("Coordination store unavailable: {0}")]
    StoreUnavailable(String),

    /// The seed blob does not exist yet. Expected until a leader publishes.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The seed blob exists but cannot be decoded.
    #[error("Corrupt cluster seed: {0}")]
    Corrupt(String),

    #[error("Blob store I/O error: {0}")]
    Io(String),

    #[error("Failed to transmit usage report: {0}")]
    Transmit(String),

    /// Every attempt to deliver one report failed.
    #[error("Usage report not delivered: {0}")]
    Report(MultiError),

    #[error("Gave up after {0} attempts")]
    RetriesExhausted(u32),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A reporter operation ran before the cluster seed was resolved.
    #[error("Reporter not initialized: {0}")]
    NotInitialized(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BeaconError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BeaconError::NotFound(_))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, BeaconError::Corrupt(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BeaconError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, BeaconError>;

/// Errors collected across retry attempts, reported as one.
#[derive(Debug, Default)]
pub struct MultiError(Vec<BeaconError>);

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: BeaconError) {
        self.0.push(err);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[BeaconError] {
        &self.0
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BeaconError::Report(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n* {err}")?;
        }
        Ok(())
    }
}

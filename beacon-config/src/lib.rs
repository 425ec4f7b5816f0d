//! Configuration library for the beacon agent.
//!
//! Loads the agent configuration from a file, inline JSON, or defaults,
//! layers environment overrides on top, and checks the result against the
//! guard rails the reporter relies on.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigSource};
pub use models::{AgentConfig, BlobBackend, CoordinationBackend, TransmitterConfig};
pub use validation::ConfigGuardRailError;

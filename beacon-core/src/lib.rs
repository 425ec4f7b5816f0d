//! # Beacon Core
//!
//! Anonymous, cluster-wide usage reporting for systems made of many
//! independently running processes.
//!
//! ## Overview
//!
//! - **Seed negotiation**: leader candidates race a compare-and-swap on a
//!   well-known key; the winner publishes the [`ClusterSeed`] to a blob store
//!   and every other process converges on it.
//! - **Corruption recovery**: a seed blob that keeps failing to decode is
//!   deleted so a leader can republish it.
//! - **Scheduling**: report slots are phase-locked to the seed's creation
//!   time, so processes of one cluster agree on boundaries while distinct
//!   clusters are staggered.
//! - **Delivery**: each slot is sent through a [`Transmitter`] with a bounded
//!   retry envelope; undelivered slots are retried on the next check.
//!
//! ## Feature Flags
//!
//! - `redis`: [`store::RedisCoordinationStore`]
//! - `cacache`: [`store::CacacheBlobStore`]
//! - `http`: [`transmitter::HttpTransmitter`]
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use beacon_core::{
//!     Reporter, ReporterConfig,
//!     store::{MemoryBlobStore, MemoryCoordinationStore},
//!     transmitter::Transmitter,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn report(transmitter: Arc<dyn Transmitter>) -> beacon_core::Result<()> {
//!     let config = ReporterConfig::default();
//!     let Some(mut reporter) = Reporter::new(
//!         config,
//!         Arc::new(MemoryCoordinationStore::new()),
//!         Arc::new(MemoryBlobStore::new()),
//!         transmitter,
//!     )?
//!     else {
//!         return Ok(());
//!     };
//!     reporter.run(&CancellationToken::new()).await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Capped exponential backoff shared by every retry loop
pub mod backoff;
pub mod clock;
/// Seed serialization for the election key and the blob
pub mod codec;
pub mod config;
/// Leader election and seed convergence
pub mod coordinator;
pub mod duration_serde;
pub mod error;
pub mod reporter;
/// Report slot arithmetic
pub mod scheduler;
/// Narrow adapter over the coordination and blob stores
pub mod seed_store;
pub mod store;
pub mod transmitter;

pub use backoff::{Backoff, BackoffConfig};
pub use beacon_model::{ClusterSeed, ClusterUid, Role, UsageReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{JsonCodec, SeedCodec};
pub use config::ReporterConfig;
pub use coordinator::{CoordinatorConfig, SeedCoordinator};
pub use error::{BeaconError, MultiError, Result};
pub use reporter::{Reporter, ReporterState, TickOutcome};
pub use scheduler::{ReportSchedule, next_report_time};
pub use seed_store::{Election, ElectionRecord, SeedStore};
pub use store::{BlobStore, CasDecision, CasUpdate, CoordinationStore};
pub use transmitter::Transmitter;

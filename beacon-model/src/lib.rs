//! # Beacon Model
//!
//! Shared data types for cluster-wide anonymous usage reporting.
//!
//! - [`ClusterSeed`]: the identity every process in a cluster converges on
//! - [`ClusterUid`]: the unique id carried by a seed
//! - [`Role`]: whether a process may publish the seed or only read it
//! - [`UsageReport`]: the body posted by the HTTP transmitter
//!
//! serde derives are gated behind the `serde` feature (enabled by default).

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ids;
pub mod report;
pub mod role;
pub mod seed;

pub use ids::ClusterUid;
pub use report::UsageReport;
pub use role::{ParseRoleError, Role};
pub use seed::ClusterSeed;

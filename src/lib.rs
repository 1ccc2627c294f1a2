//! shoot-care library crate
//!
//! Health conditions and workload cleanup for Gardener shoot clusters.
//!
//! - [`care`] turns observations of the control plane, the nodes and the
//!   system components of a shoot into four stable conditions.
//! - [`cleanup`] deletes everything a user left in a shoot before the
//!   shoot itself is deleted, removing finalizers of stuck objects.

pub mod care;
pub mod checksums;
pub mod cleanup;
pub mod config;
pub mod crd;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod retry;

pub use checksums::{ChecksumCache, encryption_config_checksum};
pub use config::{CareConfig, CleanupConfig};
pub use error::{CleanupErrors, Error, Result, StageError};
pub use metrics::CareMetrics;

//! Typed views of the custom resources read by health checks and cleanup.
//!
//! - `Shoot`: the managed cluster, its worker pools and last operation
//! - `Etcd`: etcd clusters backing the control plane
//! - `ManagedResource`: bundles of system components applied to the shoot
//! - `Worker` and other extension kinds: pluggable controllers reporting health

mod condition;
mod etcd;
mod extension;
mod managed_resource;
mod shoot;

pub use condition::*;
pub use etcd::*;
pub use extension::*;
pub use managed_resource::*;
pub use shoot::*;

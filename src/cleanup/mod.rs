//! Deletion of user workload left in a shoot.
//!
//! - `selector`: label and field selectors, including the default exclusions
//! - `target`: the [`Cleanable`] capability and its kube-backed kinds
//! - `finalizer`: forced finalizer removal
//! - `cleaner`: the list, delete and wait loop for one kind
//! - `options`: timing overrides from shoot annotations
//! - `stages`: ordered groups of kinds for a whole shoot

pub mod cleaner;
pub mod finalizer;
pub mod options;
pub mod selector;
pub mod stages;
pub mod target;

pub use cleaner::{CleanOptions, Cleaner, Clock, FinalizeAfter, SystemClock};
pub use options::StageTiming;
pub use selector::{
    Field, FieldSelector, LabelSelector, Operator, Requirement, Selector, cleanup_selector,
    unprotected_namespaces,
};
pub use stages::{ShootCleanup, Stage, StageGroup};
pub use target::{Cleanable, KubeTarget, NamespaceTarget, ObjectRef};

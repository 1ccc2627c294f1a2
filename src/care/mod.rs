//! Shoot health conditions.
//!
//! - `condition`: transition functions and the hysteresis state machine
//! - `health`: predicates for single objects
//! - `required`: names of objects that must exist
//! - `extensions`: health reports of extension controllers
//! - `checker`: checks producing condition updates
//! - `reader`: read access to seed and shoot
//! - `tunnel`: connectivity probe through the shoot's API server
//! - `orchestrator`: runs all checks of a shoot

pub mod checker;
pub mod condition;
pub mod extensions;
pub mod health;
pub mod orchestrator;
pub mod reader;
pub mod required;
pub mod tunnel;

pub use checker::HealthChecker;
pub use condition::{
    ConditionBuilder, advance, init_condition, merge_conditions, new_condition_or_error, pardon,
    updated_condition,
};
pub use extensions::{ExtensionCondition, ExtensionConditions};
pub use orchestrator::{Health, ShootConditions};
pub use reader::{
    KubeSeedReader, KubeShootClientInit, KubeShootReader, SeedReader, ShootClientInit, ShootReader,
};

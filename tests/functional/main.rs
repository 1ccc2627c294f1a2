// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for shoot health checks and workload cleanup.
//!
//! These tests run the health orchestrator and the cleanup engine end to end
//! against in-memory seed, shoot and object backends. No Kubernetes cluster
//! is required; time-dependent scenarios run on tokio's paused clock.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_unhealthy_deployment_progresses_then_fails
//! ```
//!
//! ## Test Categories
//!
//! - **Care scenarios**: hibernation, unreachable API server, threshold
//!   handling and the healthy path of all four conditions
//! - **Cleanup scenarios**: convergence, finalizer escalation, conflict
//!   tolerance and aggregated stage failures

#[path = "../common/mod.rs"]
mod common;

//! Shared test infrastructure: object builders and in-memory backends.

#![allow(dead_code)]

pub mod fixtures;

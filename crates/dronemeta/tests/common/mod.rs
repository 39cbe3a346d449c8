//! Shared test utilities for dronemeta integration tests.
//!
//! - `TestHarness` owns an isolated temp tree with input, output and config dirs
//! - builders create configs and DJI subtitle sidecars without boilerplate

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{InvariantReporter, TestHarness};

//! Shared test utilities for prodboard integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories
//! - Builder patterns for configs, criteria and production data

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FlakyManager, TestHarness};

//! # RTS Test Utilities
//!
//! Shared testing utilities for the kernel and tools:
//! - Determinism test harness
//! - Fixture maps and scenarios
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;

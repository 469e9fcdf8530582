//! Shared helpers for the integration tests.
//!
//! - Isolated base directories with fake log collectors on a private path
//! - An in-memory process table for signalling scenarios
//! - Polling assertions for state that settles asynchronously

pub mod fake_process;
pub mod fixtures;

#[allow(unused_imports)]
pub use fake_process::*;
pub use fixtures::*;

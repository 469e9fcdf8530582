//! # cake-protocol
//!
//! Shared data models for cakestack.
//!
//! This crate defines the structures that cross a process boundary:
//! - Service definitions parsed from `config.yaml`
//! - Global settings parsed from `settings.toml`
//! - Instance metadata persisted as `proc.json`, read back by later
//!   invocations and by external log viewers
//! - Status reports produced by the service controller
//!
//! ## Modules
//!
//! - [`definition_models`]: Per-tag service definitions
//! - [`config_models`]: Global settings
//! - [`instance_models`]: Instance identity, metadata and on-disk snapshots
//! - [`status_models`]: Lifecycle states and status reports
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde, chrono and ts-rs
//! - TypeScript generation: all types derive `TS` so viewers can read
//!   instance metadata with generated bindings
//! - Independent compilation: no dependencies on other cakestack crates

pub mod config_models;
pub mod definition_models;
pub mod instance_models;
pub mod status_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use definition_models::*;
pub use instance_models::*;
pub use status_models::*;

//! Configuration loading and management.
//!
//! This module loads the per-invocation view of the world: global settings,
//! the tag definitions, each tag's instance list and the instances present
//! under the instance root.

pub mod error;
pub mod loader;
pub mod models;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use models::Paths;
pub use store::{ConfigStore, ServiceEntry};

//! Instance state and service lifecycle.
//!
//! - [`store`]: on-disk records of instances and tag run directories
//! - [`controller`]: the start/stop/status state machine built on top

pub mod controller;
pub mod error;
pub mod store;

pub use controller::{shell_quote, ServiceController, StartOutcome, StopOutcome};
pub use error::{StateError, StateResult};
pub use store::InstanceStore;

//! # cake-core
//!
//! Lifecycle core of cakestack, a file-state-backed process supervisor.
//!
//! Every invocation loads its configuration fresh, inspects the OS process
//! table and the instance records on disk, acts, and exits. Nothing is kept
//! in memory between invocations.
//!
//! ## Modules
//!
//! - [`config`]: definitions, settings and instance discovery
//! - [`workdir`]: execution directory resolution
//! - [`process`]: process liveness, trees and signals
//! - [`logsink`]: external log collectors
//! - [`state`]: instance records and the service controller
//! - [`context`]: per-invocation bundle of the above
//! - [`init`]: starter configuration files

pub mod config;
pub mod context;
pub mod init;
pub mod logsink;
pub mod process;
pub mod state;
pub mod workdir;

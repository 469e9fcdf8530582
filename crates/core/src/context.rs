//! Per-invocation context.
//!
//! Everything an operation needs is loaded once into a [`Context`] and
//! passed explicitly; there is no process-wide configuration cache.

use crate::config::{ConfigResult, ConfigStore};
use crate::logsink::LogSinkPipeline;
use crate::process::{ProcessTable, SystemProcessTable};
use crate::state::store::InstanceStore;
use crate::workdir::WorkingDirectoryResolver;
use std::path::Path;
use std::sync::Arc;

pub struct Context {
    pub config: ConfigStore,
    pub store: InstanceStore,
    pub resolver: WorkingDirectoryResolver,
    pub sinks: LogSinkPipeline,
    pub processes: Arc<dyn ProcessTable>,
}

impl Context {
    /// Load configuration under `base` and bind to the host OS.
    pub fn load(base: &Path) -> ConfigResult<Self> {
        let config = ConfigStore::load(base)?;
        let sinks = LogSinkPipeline::detect(config.settings());
        Ok(Self::new(config, sinks, Arc::new(SystemProcessTable::new())))
    }

    /// Assemble a context from explicit parts.
    pub fn new(
        config: ConfigStore,
        sinks: LogSinkPipeline,
        processes: Arc<dyn ProcessTable>,
    ) -> Self {
        let store = InstanceStore::new(config.paths().clone());
        let resolver = WorkingDirectoryResolver::new(config.paths().base.clone());
        Self {
            config,
            store,
            resolver,
            sinks,
            processes,
        }
    }
}

//! Per-invocation view of definitions and instances.

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::loader::{absolute_base, load_definitions, load_instance_list, load_settings};
use crate::config::models::{Paths, SETTINGS_FILE};
use crate::state::store::InstanceStore;
use cake_protocol::{Definition, InstanceId, InstanceSnapshot, Settings};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// A tag's definition together with its instance history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub definition: Definition,

    /// Instance ids in creation order. The last one is current.
    pub instances: Vec<InstanceId>,
}

impl ServiceEntry {
    pub fn current_instance(&self) -> Option<&InstanceId> {
        self.instances.last()
    }
}

/// Immutable snapshot of the configuration, loaded once per invocation.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: Paths,
    settings: Settings,
    services: BTreeMap<String, ServiceEntry>,
}

impl ConfigStore {
    /// Load settings, definitions and instance lists under `base`.
    ///
    /// A relative `base` is resolved against the current directory.
    pub fn load(base: &Path) -> ConfigResult<Self> {
        let base = absolute_base(base)?;
        let base = base.as_path();
        let settings = load_settings(&base.join(SETTINGS_FILE))?;
        let paths = Paths::new(base, &settings);
        let definitions = load_definitions(&paths.definitions_file)?;

        let mut services = BTreeMap::new();
        for (tag, definition) in definitions {
            let instances = load_instance_list(&InstanceStore::instance_list_path(&paths, &tag))?;
            services.insert(
                tag,
                ServiceEntry {
                    definition,
                    instances,
                },
            );
        }

        debug!(base = %base.display(), services = services.len(), "configuration loaded");
        Ok(Self {
            paths,
            settings,
            services,
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// All configured tags with their definitions and instance lists.
    pub fn definitions(&self) -> &BTreeMap<String, ServiceEntry> {
        &self.services
    }

    pub fn service(&self, tag: &str) -> Option<&ServiceEntry> {
        self.services.get(tag)
    }

    /// The last instance recorded for `tag` at load time.
    pub fn current_instance(&self, tag: &str) -> Option<&InstanceId> {
        self.services.get(tag).and_then(ServiceEntry::current_instance)
    }

    /// Scan the instance root for every instance directory.
    ///
    /// Entries whose name is not an instance id are skipped. Directories with
    /// no readable artefacts produce empty snapshots.
    pub fn instances(&self) -> ConfigResult<BTreeMap<InstanceId, InstanceSnapshot>> {
        let root = &self.paths.instance_root;
        let mut instances = BTreeMap::new();
        if !root.is_dir() {
            return Ok(instances);
        }

        let store = InstanceStore::new(self.paths.clone());
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<InstanceId>().ok())
            else {
                debug!(path = %entry.path().display(), "skipping non-instance entry");
                continue;
            };

            instances.insert(id.clone(), store.snapshot(&id));
        }

        Ok(instances)
    }
}

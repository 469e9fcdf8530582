//! Base directory generation for `cake init`.

use super::error::{InitError, InitResult};
use super::templates::{get_template, list_templates};
use crate::config::loader::default_base_dir;
use crate::config::models::{Paths, DEFINITIONS_FILE};
use cake_protocol::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Options for initializing a base directory.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Base directory to populate.
    pub base: PathBuf,

    /// Overwrite existing starter files.
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            base: default_base_dir(),
            force: false,
        }
    }
}

/// Populate a base directory with starter files.
///
/// ```text
/// <base>/
/// ├── config.yaml
/// ├── settings.toml
/// ├── run/
/// └── instances/
/// ```
///
/// Fails with [`InitError::AlreadyInitialized`] when `config.yaml` exists
/// and `force` is not set. Run and instance state is never touched.
pub async fn generate_base_structure(options: InitOptions) -> InitResult<Paths> {
    let definitions = options.base.join(DEFINITIONS_FILE);
    if definitions.exists() && !options.force {
        return Err(InitError::AlreadyInitialized(definitions));
    }

    let paths = Paths::new(&options.base, &Settings::default());
    for dir in [&paths.base, &paths.run_root, &paths.instance_root] {
        fs::create_dir_all(dir).map_err(|source| InitError::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
    }

    for template in list_templates() {
        write_template_file(&paths.base, &template)?;
    }

    info!("initialized {}", paths.base.display());
    Ok(paths)
}

fn write_template_file(base: &Path, template_path: &str) -> InitResult<()> {
    let content = get_template(template_path)
        .ok_or_else(|| InitError::TemplateNotFound(template_path.to_string()))?;

    let target_path = base.join(template_path);
    fs::write(&target_path, content).map_err(|source| InitError::FileWrite {
        path: target_path,
        source,
    })
}

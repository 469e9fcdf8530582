//! Configuration file loader for the cakestack base directory.
//!
//! This module provides functionality to load and parse:
//! - `settings.toml`: Global settings
//! - `config.yaml`: Tag definitions
//! - `run/<tag>/instances`: Per-tag instance lists

use crate::config::error::{ConfigError, ConfigResult};
use crate::state::store::parse_instance_list;
use cake_protocol::{Definition, InstanceId, Settings};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the base directory.
pub const BASE_DIR_ENV: &str = "CAKESTACK_DIR";

/// Base directory used when [`BASE_DIR_ENV`] is unset.
pub const DEFAULT_BASE_DIR: &str = "$HOME/.cakestack";

/// Expand `$VAR`, `${VAR}` and a leading `~`.
///
/// Unknown variables are left verbatim rather than treated as errors.
pub fn expand_vars(raw: &str) -> String {
    shellexpand::full_with_context_no_errors(
        raw,
        || std::env::var("HOME").ok(),
        |var: &str| std::env::var(var).ok(),
    )
    .into_owned()
}

/// The base directory for this invocation.
pub fn default_base_dir() -> PathBuf {
    let raw = std::env::var(BASE_DIR_ENV).unwrap_or_else(|_| DEFAULT_BASE_DIR.to_string());
    PathBuf::from(expand_vars(&raw))
}

/// Anchor `base` at the current directory if it is relative.
///
/// `.` and `..` are folded lexically, so the same directory spelled two ways
/// yields the same recorded paths.
pub fn absolute_base(base: &Path) -> ConfigResult<PathBuf> {
    let absolute = std::path::absolute(base).map_err(|source| ConfigError::BaseDir {
        path: base.to_path_buf(),
        source,
    })?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Loads global settings from `settings.toml`.
///
/// A missing file yields [`Settings::default`].
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    let Some(content) = read_optional(path)? else {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    };

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the tag definitions from `config.yaml`.
///
/// A missing file is logged and yields an empty mapping; the supervisor can
/// still report on and stop existing instances without one.
pub fn load_definitions(path: &Path) -> ConfigResult<BTreeMap<String, Definition>> {
    let Some(content) = read_optional(path)? else {
        warn!(path = %path.display(), "config file not found");
        return Ok(BTreeMap::new());
    };

    let definitions: Option<BTreeMap<String, Definition>> = if content.trim().is_empty() {
        None
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?
    };
    let definitions = definitions.unwrap_or_default();

    if let Some(tag) = definitions.keys().find(|tag| !is_valid_tag(tag)) {
        return Err(ConfigError::InvalidTag {
            path: path.to_path_buf(),
            tag: tag.clone(),
        });
    }

    Ok(definitions)
}

/// Reads a tag's `instances` file. A missing file is an empty list.
pub fn load_instance_list(path: &Path) -> ConfigResult<Vec<InstanceId>> {
    Ok(read_optional(path)?
        .map(|content| parse_instance_list(&content))
        .unwrap_or_default())
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && tag != "." && tag != ".." && !tag.contains(['/', '\\'])
}

fn read_optional(path: &Path) -> ConfigResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

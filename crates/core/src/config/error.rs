//! Error types for configuration loading.
//!
//! This module defines all errors that can occur while reading the
//! definitions file, the settings file and the run/instance directories.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading.
///
/// A missing definitions or settings file is not an error; both degrade to
/// empty/default values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The base directory could not be made absolute.
    #[error("Failed to resolve base directory {path}: {source}")]
    BaseDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a configuration file from disk.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the TOML settings file.
    #[error("Failed to parse TOML file at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to parse the YAML definitions file.
    #[error("Failed to parse YAML file at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Failed to walk the instance root.
    #[error("Failed to traverse directory {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// A tag name that cannot be used as a run directory name.
    #[error("Invalid tag {tag:?} in {path}: tags must be non-empty and contain no path separators")]
    InvalidTag { path: PathBuf, tag: String },
}

/// Type alias for Result with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Filesystem layout derived from the base directory and settings.
//!
//! ```text
//! <base>/
//! ├── config.yaml                 tag -> definition
//! ├── settings.toml               optional global settings
//! ├── run/<tag>/                  run_root
//! │   ├── instances               instance ids, one per line
//! │   ├── .lock                   advisory start lock
//! │   └── repo/latest, repo/<rev>/
//! └── instances/<instance_id>/    instance_root
//!     ├── pid, proc.json, exit, stopped
//!     ├── out.log, err.log (or out.log.d/, err.log.d/)
//!     └── work/
//! ```

use crate::config::loader::expand_vars;
use cake_protocol::{InstanceId, Settings};
use std::path::{Path, PathBuf};

/// Name of the definitions file inside the base directory.
pub const DEFINITIONS_FILE: &str = "config.yaml";

/// Name of the settings file inside the base directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Resolved locations of every file the supervisor reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub base: PathBuf,
    pub definitions_file: PathBuf,
    pub settings_file: PathBuf,
    pub run_root: PathBuf,
    pub instance_root: PathBuf,
}

impl Paths {
    /// Derive the layout for `base`, honouring root overrides in `settings`.
    ///
    /// Relative overrides are taken relative to `base`.
    pub fn new(base: &Path, settings: &Settings) -> Self {
        let root = |configured: &Option<String>, default: &str| {
            configured
                .as_deref()
                .map(|raw| base.join(expand_vars(raw)))
                .unwrap_or_else(|| base.join(default))
        };

        Self {
            base: base.to_path_buf(),
            definitions_file: base.join(DEFINITIONS_FILE),
            settings_file: base.join(SETTINGS_FILE),
            run_root: root(&settings.run_root, "run"),
            instance_root: root(&settings.instance_root, "instances"),
        }
    }

    /// Run directory of a tag. Not created here.
    pub fn tag_run_dir(&self, tag: &str) -> PathBuf {
        self.run_root.join(tag)
    }

    /// Directory of an instance. Not created here.
    pub fn instance_dir(&self, id: &InstanceId) -> PathBuf {
        self.instance_root.join(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let paths = Paths::new(Path::new("/srv/cake"), &Settings::default());
        assert_eq!(paths.definitions_file, PathBuf::from("/srv/cake/config.yaml"));
        assert_eq!(paths.settings_file, PathBuf::from("/srv/cake/settings.toml"));
        assert_eq!(paths.run_root, PathBuf::from("/srv/cake/run"));
        assert_eq!(paths.instance_root, PathBuf::from("/srv/cake/instances"));
        assert_eq!(paths.tag_run_dir("api"), PathBuf::from("/srv/cake/run/api"));
    }

    #[test]
    fn test_root_overrides() {
        let settings = Settings {
            run_root: Some("/var/run/cake".to_string()),
            instance_root: Some("state".to_string()),
            ..Settings::default()
        };
        let paths = Paths::new(Path::new("/srv/cake"), &settings);
        assert_eq!(paths.run_root, PathBuf::from("/var/run/cake"));
        assert_eq!(paths.instance_root, PathBuf::from("/srv/cake/state"));

        let id: InstanceId = "abcd1234".parse().unwrap();
        assert_eq!(
            paths.instance_dir(&id),
            PathBuf::from("/srv/cake/state/abcd1234")
        );
    }
}

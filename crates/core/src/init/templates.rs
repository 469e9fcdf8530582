//! Starter files embedded into the binary.
//!
//! The repository's `templates/` directory is compiled in with `rust-embed`,
//! so `cake init` works without any files installed next to the binary.

use rust_embed::RustEmbed;

/// Embedded template files from the `templates/` directory.
///
/// The path is relative to the crate root:
/// - `CARGO_MANIFEST_DIR` = `crates/core`
/// - `../../templates` = repository root `templates/`
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../templates"]
pub struct TemplateAssets;

/// Get template file content by path, e.g. `"config.yaml"`.
pub fn get_template(path: &str) -> Option<String> {
    TemplateAssets::get(path).map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}

/// All embedded template paths.
pub fn list_templates() -> Vec<String> {
    let mut paths: Vec<String> = TemplateAssets::iter().map(|path| path.to_string()).collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use cake_protocol::{Definition, Settings};
    use std::collections::BTreeMap;

    #[test]
    fn test_definitions_template_parses() {
        let content = get_template("config.yaml").expect("config.yaml should be embedded");
        let definitions: BTreeMap<String, Definition> =
            serde_yaml::from_str(&content).expect("Template should be valid YAML");
        assert_eq!(
            definitions["hello"].entry(),
            Some("while true; do date; sleep 60; done")
        );
    }

    #[test]
    fn test_settings_template_matches_defaults() {
        let content = get_template("settings.toml").expect("settings.toml should be embedded");
        let settings: Settings = toml::from_str(&content).expect("Template should be valid TOML");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_get_nonexistent_template() {
        assert!(get_template("nonexistent.txt").is_none());
    }

    #[test]
    fn test_list_templates() {
        assert_eq!(list_templates(), vec!["config.yaml", "settings.toml"]);
    }
}

//! Working-directory resolution for service definitions.
//!
//! Priority, first match wins:
//! 1. `dir`: expanded and returned as is; git fields are ignored.
//! 2. `git`: `<tag_run_dir>/repo/<revision>`, where the revision is pinned
//!    in the definition or read from `repo/latest`.
//! 3. otherwise: the instance's own `work/` directory.
//!
//! Checkouts are populated by an external fetcher; nothing here clones or
//! updates a repository.

use crate::config::loader::expand_vars;
use cake_protocol::Definition;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort resolution of a working directory.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// Unpinned git service with no `repo/latest` pointer.
    #[error("No latest revision recorded at {0:?}")]
    NoLatestRevision(PathBuf),

    /// The selected revision has not been checked out.
    #[error("No checkout found for revision {revision:?} at {path:?}")]
    MissingCheckout { revision: String, path: PathBuf },

    /// Git-scheme definitions need a tag run directory.
    #[error("Git checkouts require a tagged service")]
    NoRunDir,

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Type alias for Result with ResolutionError.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

const REPO_DIR: &str = "repo";
const LATEST_FILE: &str = "latest";

/// Computes where a service's command runs.
#[derive(Debug, Clone)]
pub struct WorkingDirectoryResolver {
    base: PathBuf,
}

impl WorkingDirectoryResolver {
    /// Relative `dir` values are resolved against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve the execution directory.
    ///
    /// This only reads the filesystem. `instance_work_dir` is returned for
    /// definitions without `dir` or `git` but is not created.
    pub fn resolve(
        &self,
        definition: &Definition,
        tag_run_dir: Option<&Path>,
        instance_work_dir: &Path,
    ) -> ResolutionResult<PathBuf> {
        if let Some(dir) = &definition.dir {
            return Ok(self.base.join(expand_vars(dir)));
        }

        if definition.git {
            let repo = tag_run_dir.ok_or(ResolutionError::NoRunDir)?.join(REPO_DIR);
            let revision = match &definition.revision {
                Some(revision) => revision.clone(),
                None => read_latest(&repo.join(LATEST_FILE))?,
            };

            let checkout = repo.join(&revision);
            if !checkout.is_dir() {
                return Err(ResolutionError::MissingCheckout {
                    revision,
                    path: checkout,
                });
            }
            return Ok(checkout);
        }

        Ok(instance_work_dir.to_path_buf())
    }
}

fn read_latest(path: &Path) -> ResolutionResult<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ResolutionError::NoLatestRevision(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ResolutionError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    content
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResolutionError::NoLatestRevision(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn git_definition(revision: Option<&str>) -> Definition {
        Definition {
            entry: Some("./run".to_string()),
            git: true,
            revision: revision.map(str::to_string),
            ..Definition::default()
        }
    }

    #[test]
    fn test_dir_wins_over_git() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::env::set_var("CAKE_TEST_WORKDIR_ROOT", "/opt/services");
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let def = Definition {
            dir: Some("$CAKE_TEST_WORKDIR_ROOT/api".to_string()),
            ..git_definition(Some("deadbeef"))
        };

        // No repo/ exists at all; git fields must not be consulted.
        let resolved = resolver
            .resolve(&def, Some(&dir.path().join("run/api")), dir.path())
            .expect("dir should resolve");
        assert_eq!(resolved, PathBuf::from("/opt/services/api"));
    }

    #[test]
    fn test_relative_dir_is_anchored_at_base() {
        let dir = tempdir().expect("Failed to create temp dir");
        let resolver = WorkingDirectoryResolver::new(dir.path());
        let def = Definition {
            dir: Some("apps/web".to_string()),
            ..Definition::default()
        };

        let resolved = resolver.resolve(&def, None, dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("apps/web"));
    }

    #[test]
    fn test_pinned_revision_ignores_latest() {
        let dir = tempdir().expect("Failed to create temp dir");
        let run_dir = dir.path().join("run/api");
        fs::create_dir_all(run_dir.join("repo/pinned")).unwrap();
        fs::create_dir_all(run_dir.join("repo/newer")).unwrap();
        fs::write(run_dir.join("repo/latest"), "newer\n").unwrap();
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let resolved = resolver
            .resolve(&git_definition(Some("pinned")), Some(&run_dir), dir.path())
            .unwrap();
        assert_eq!(resolved, run_dir.join("repo/pinned"));
    }

    #[test]
    fn test_pinned_revision_without_latest_or_checkout() {
        let dir = tempdir().expect("Failed to create temp dir");
        let run_dir = dir.path().join("run/api");
        fs::create_dir_all(run_dir.join("repo")).unwrap();
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let result = resolver.resolve(&git_definition(Some("cafe")), Some(&run_dir), dir.path());
        match result {
            Err(ResolutionError::MissingCheckout { revision, path }) => {
                assert_eq!(revision, "cafe");
                assert_eq!(path, run_dir.join("repo/cafe"));
            }
            other => panic!("Expected MissingCheckout, got {other:?}"),
        }
    }

    #[test]
    fn test_unpinned_reads_latest() {
        let dir = tempdir().expect("Failed to create temp dir");
        let run_dir = dir.path().join("run/api");
        fs::create_dir_all(run_dir.join("repo/abc123")).unwrap();
        fs::write(run_dir.join("repo/latest"), "abc123\nignored second line\n").unwrap();
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let resolved = resolver
            .resolve(&git_definition(None), Some(&run_dir), dir.path())
            .unwrap();
        assert_eq!(resolved, run_dir.join("repo/abc123"));
    }

    #[test]
    fn test_unpinned_without_latest() {
        let dir = tempdir().expect("Failed to create temp dir");
        let run_dir = dir.path().join("run/api");
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let result = resolver.resolve(&git_definition(None), Some(&run_dir), dir.path());
        assert!(matches!(result, Err(ResolutionError::NoLatestRevision(_))));

        fs::create_dir_all(run_dir.join("repo")).unwrap();
        fs::write(run_dir.join("repo/latest"), "   \n").unwrap();
        let result = resolver.resolve(&git_definition(None), Some(&run_dir), dir.path());
        assert!(matches!(result, Err(ResolutionError::NoLatestRevision(_))));
    }

    #[test]
    fn test_unpinned_latest_without_checkout() {
        let dir = tempdir().expect("Failed to create temp dir");
        let run_dir = dir.path().join("run/api");
        fs::create_dir_all(run_dir.join("repo")).unwrap();
        fs::write(run_dir.join("repo/latest"), "gone\n").unwrap();
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let result = resolver.resolve(&git_definition(None), Some(&run_dir), dir.path());
        assert!(matches!(result, Err(ResolutionError::MissingCheckout { .. })));
    }

    #[test]
    fn test_git_requires_tag() {
        let dir = tempdir().expect("Failed to create temp dir");
        let resolver = WorkingDirectoryResolver::new(dir.path());

        let result = resolver.resolve(&git_definition(Some("x")), None, dir.path());
        assert!(matches!(result, Err(ResolutionError::NoRunDir)));
    }

    #[test]
    fn test_fallback_is_instance_work_dir() {
        let dir = tempdir().expect("Failed to create temp dir");
        let resolver = WorkingDirectoryResolver::new(dir.path());
        let work_dir = dir.path().join("instances/abcd1234/work");

        let def = Definition::adhoc("true", None);
        let resolved = resolver
            .resolve(&def, Some(&dir.path().join("run/x")), &work_dir)
            .unwrap();
        assert_eq!(resolved, work_dir);
        assert!(!resolved.exists(), "resolution must not create directories");
    }
}

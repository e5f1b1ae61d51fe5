// ABOUTME: Resolves request paths against the workspace and rejects anything outside the allowed roots
// ABOUTME: Symlinks are followed through the deepest existing ancestor before the containment check

use crate::error::{Result, ServerError};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Path resolver confined to the workspace and the skill install root
#[derive(Debug, Clone)]
pub struct PathJail {
    workspace: PathBuf,
    install_root: PathBuf,
}

impl PathJail {
    pub fn new(workspace: impl AsRef<Path>, install_root: impl AsRef<Path>) -> Self {
        Self {
            workspace: resolve_existing(&normalize(workspace.as_ref())),
            install_root: resolve_existing(&normalize(install_root.as_ref())),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Resolve a request path; relative paths are taken from the workspace
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let candidate = if raw.is_empty() {
            self.workspace.clone()
        } else if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.workspace.join(raw)
        };

        let resolved = resolve_existing(&normalize(&candidate));

        if resolved.starts_with(&self.workspace) || resolved.starts_with(&self.install_root) {
            debug!("Resolved {} -> {}", raw, resolved.display());
            Ok(resolved)
        } else {
            warn!("Rejected path outside allowed roots: {}", raw);
            Err(ServerError::OutsideRoots(raw.to_string()))
        }
    }
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root leaves the root
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the missing tail
fn resolve_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if rest.as_os_str().is_empty() => canonical,
                Ok(rest) => canonical.join(rest),
                Err(_) => canonical,
            };
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn jail() -> (TempDir, PathJail) {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("workspace/src")).unwrap();
        std::fs::create_dir_all(root.path().join("skills/tool")).unwrap();
        std::fs::create_dir_all(root.path().join("outside")).unwrap();
        let jail = PathJail::new(root.path().join("workspace"), root.path().join("skills"));
        (root, jail)
    }

    #[rstest]
    #[case("src")]
    #[case("./src/../src/main.rs")]
    #[case("new/dir/file.txt")]
    #[case("")]
    fn test_paths_inside_workspace_resolve(#[case] raw: &str) {
        let (_root, jail) = jail();
        let resolved = jail.resolve(raw).unwrap();
        assert!(resolved.starts_with(jail.workspace()));
    }

    #[rstest]
    #[case("../outside")]
    #[case("src/../../outside/secret")]
    #[case("/etc/passwd")]
    fn test_paths_escaping_roots_are_rejected(#[case] raw: &str) {
        let (_root, jail) = jail();
        assert!(matches!(jail.resolve(raw), Err(ServerError::OutsideRoots(_))));
    }

    #[test]
    fn test_install_root_is_allowed() {
        let (_root, jail) = jail();
        let raw = jail.install_root().join("tool").to_string_lossy().to_string();
        assert!(jail.resolve(&raw).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_workspace_is_rejected() {
        let (root, jail) = jail();
        std::os::unix::fs::symlink(root.path().join("outside"), jail.workspace().join("escape"))
            .unwrap();

        assert!(matches!(
            jail.resolve("escape/file.txt"),
            Err(ServerError::OutsideRoots(_))
        ));
    }
}

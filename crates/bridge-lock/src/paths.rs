//! Canonical path resolution for the bridge working tree (spec §4.1).

use std::path::{Path, PathBuf};

/// Standard layout rooted at a project's working tree. All paths are
/// computed, never configurable per-call, so every crate in the workspace
/// agrees on where state, locks, and events live.
#[derive(Debug, Clone)]
pub struct BridgePaths {
    root: PathBuf,
}

impl BridgePaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".bridge").join("state")
    }

    pub fn event_dir(&self) -> PathBuf {
        self.root.join(".bridge").join("events")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.root.join(".bridge").join("locks")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".bridge").join("cache")
    }

    pub fn grimoire_dir(&self) -> PathBuf {
        self.root.join("grimoires").join("loa")
    }

    pub fn sprint_plan(&self) -> PathBuf {
        self.grimoire_dir().join("sprint-plan.md")
    }

    pub fn prd(&self) -> PathBuf {
        self.grimoire_dir().join("prd.md")
    }

    pub fn sdd(&self) -> PathBuf {
        self.grimoire_dir().join("sdd.md")
    }

    pub fn vision_dir(&self) -> PathBuf {
        self.root.join("grimoires").join("visions")
    }

    pub fn vision_index(&self) -> PathBuf {
        self.vision_dir().join("index.md")
    }

    pub fn lore_file(&self) -> PathBuf {
        self.root.join("grimoires").join("lore.yaml")
    }

    pub fn agent_readme(&self) -> PathBuf {
        self.root.join("AGENTS.md")
    }

    /// Canonicalize `candidate` and verify it resolves strictly inside the
    /// project root. Used by the Document Editor and Context Query Facade
    /// to reject `..`/symlink escapes (spec §4.2, §4.4, §8 property 3).
    ///
    /// `candidate` need not exist yet (the Document Editor validates paths
    /// for files it is about to create), so when `canonicalize` fails for
    /// want of the file existing, fall back to a purely lexical `..`/`.`
    /// resolution rather than trusting the unresolved path verbatim.
    pub fn ensure_within_root(&self, candidate: &Path) -> anyhow::Result<PathBuf> {
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let resolved = resolved
            .canonicalize()
            .unwrap_or_else(|_| lexically_normalize(&resolved));
        // Exact-prefix check with a trailing separator, to avoid
        // `/project-root-evil` matching a naive `starts_with("/project-root")`.
        let root_with_sep = {
            let mut s = root.as_os_str().to_owned();
            s.push(std::path::MAIN_SEPARATOR.to_string());
            PathBuf::from(s)
        };
        if resolved == root || resolved.starts_with(&root_with_sep) {
            Ok(resolved)
        } else {
            anyhow::bail!(
                "path {} resolves outside project root {}",
                candidate.display(),
                root.display()
            )
        }
    }
}

/// Resolve `.`/`..` components against a path that may not exist on disk,
/// without ever consulting the filesystem.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn standard_paths_are_rooted_under_dot_bridge() {
        let paths = BridgePaths::new("/tmp/proj");
        assert_eq!(paths.state_dir(), PathBuf::from("/tmp/proj/.bridge/state"));
        assert_eq!(paths.lock_dir(), PathBuf::from("/tmp/proj/.bridge/locks"));
        assert_eq!(paths.event_dir(), PathBuf::from("/tmp/proj/.bridge/events"));
    }

    #[test]
    fn ensure_within_root_accepts_child_path() {
        let td = tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("grimoires")).unwrap();
        let paths = BridgePaths::new(td.path());
        let ok = paths.ensure_within_root(Path::new("grimoires"));
        assert!(ok.is_ok());
    }

    #[test]
    fn ensure_within_root_rejects_traversal() {
        let td = tempdir().unwrap();
        let paths = BridgePaths::new(td.path());
        let escaped = Path::new("../../etc/passwd");
        let result = paths.ensure_within_root(escaped);
        assert!(result.is_err());
    }

    #[test]
    fn ensure_within_root_rejects_traversal_to_a_file_that_does_not_exist_yet() {
        let td = tempdir().unwrap();
        let paths = BridgePaths::new(td.path());
        let escaped = Path::new("../escape.md");
        let result = paths.ensure_within_root(escaped);
        assert!(result.is_err());
    }
}

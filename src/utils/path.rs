//! Path helpers shared by the scanner, the output writer and the watcher.
//!
//! Output containment is decided lexically first (targets usually do not exist
//! yet), then re-checked against the deepest existing ancestor so a symlink
//! inside the output root cannot redirect a write outside of it.

use std::{
    env,
    path::{Component, Path, PathBuf},
};

/// Normalize a path to absolute form for reliable comparison.
///
/// Config paths are canonicalized, so incoming paths (e.g. from the file
/// watcher) must be canonicalized the same way before comparison.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        };
        // Deleted files cannot be canonicalized; resolve through the parent.
        match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map_or_else(|_| clean_path(&absolute), |p| p.join(name)),
            _ => clean_path(&absolute),
        }
    })
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root of an absolute path is dropped; on a relative path it is
/// kept so the caller can still detect the escape.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = out.as_os_str().is_empty()
                    || matches!(out.components().next_back(), Some(Component::ParentDir));
                if at_root && !path.is_absolute() {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `target` against `root` and return it only if it stays inside.
///
/// `root` must already be canonical. Absolute targets are accepted when they
/// point into the root. The root itself is not a valid file target.
pub fn contained_in(root: &Path, target: &Path) -> Option<PathBuf> {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        root.join(target)
    };
    let cleaned = clean_path(&joined);
    if cleaned == root || !cleaned.starts_with(root) {
        return None;
    }

    // Follow symlinks on the part of the path that already exists.
    let existing = cleaned.ancestors().find(|p| p.exists())?;
    let real = existing.canonicalize().ok()?;
    real.starts_with(root).then_some(cleaned)
}

/// Page name for a source file: relative path, forward slashes, no extension.
///
/// `blog/index.html` → `blog/index`
pub fn page_name(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if path is a temp/backup file (editor artifacts).
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Trim slashes around a rendered path (`/blog/a/` → `blog/a`).
pub fn trim_slashes(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_path_resolves_parent() {
        assert_eq!(clean_path(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_clean_path_keeps_relative_escape() {
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new("a/../../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_clean_path_absolute_root_parent() {
        assert_eq!(clean_path(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_contained_in_accepts_descendants() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();

        let resolved = contained_in(&root, Path::new("blog/a/index.html")).unwrap();
        assert_eq!(resolved, root.join("blog/a/index.html"));
    }

    #[test]
    fn test_contained_in_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert!(contained_in(&root, Path::new("../outside.html")).is_none());
        assert!(contained_in(&root, Path::new("a/../../outside.html")).is_none());
        assert!(contained_in(&root, Path::new("/etc/passwd")).is_none());
        assert!(contained_in(&root, Path::new("")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_contained_in_rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(contained_in(&root, Path::new("link/file.txt")).is_none());
    }

    #[test]
    fn test_page_name() {
        assert_eq!(page_name(Path::new("blog/index.html")), "blog/index");
        assert_eq!(page_name(Path::new("about.html")), "about");
        assert_eq!(page_name(Path::new("layouts/base")), "layouts/base");
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("pages/index.html.swp")));
        assert!(is_temp_file(Path::new("pages/index.html~")));
        assert!(is_temp_file(Path::new("pages/.index.html")));
        assert!(!is_temp_file(Path::new("pages/index.html")));
    }

    #[test]
    fn test_trim_slashes() {
        assert_eq!(trim_slashes("/blog/a/"), "blog/a");
        assert_eq!(trim_slashes("/"), "");
    }
}

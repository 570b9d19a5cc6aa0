//! Path-safe artifact writer.
//!
//! Every target is resolved against the output root and checked for
//! containment before anything touches the filesystem. Successful writes are
//! appended to the [`Ledger`].

use super::ledger::{ArtifactKind, Ledger};
use crate::utils::path::contained_in;
use parking_lot::{Mutex, MutexGuard};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("refusing to write `{}` outside of output root `{}`", .target.display(), .root.display())]
    OutsideRoot { root: PathBuf, target: PathBuf },

    #[error("failed to write `{}`", .0.display())]
    Io(PathBuf, #[source] io::Error),
}

#[derive(Debug)]
pub struct OutputWriter {
    /// Canonical output root.
    root: PathBuf,
    ledger: Mutex<Ledger>,
}

impl OutputWriter {
    /// Create the output root if needed and canonicalize it.
    pub fn new(root: &Path) -> Result<Self, WriteError> {
        fs::create_dir_all(root).map_err(|e| WriteError::Io(root.to_path_buf(), e))?;
        let root = root
            .canonicalize()
            .map_err(|e| WriteError::Io(root.to_path_buf(), e))?;
        Ok(Self {
            root,
            ledger: Mutex::new(Ledger::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock()
    }

    /// Absolute path of `target` if it stays inside the output root.
    pub fn resolve(&self, target: &Path) -> Result<PathBuf, WriteError> {
        contained_in(&self.root, target).ok_or_else(|| WriteError::OutsideRoot {
            root: self.root.clone(),
            target: target.to_path_buf(),
        })
    }

    /// Write `contents` to `target` (relative to the output root) and record it.
    pub async fn write(
        &self,
        kind: ArtifactKind,
        source: &str,
        target: &Path,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, WriteError> {
        let path = self.resolve(target)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WriteError::Io(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| WriteError::Io(path.clone(), e))?;

        self.ledger.lock().record(kind, source, path.clone());
        Ok(path)
    }
}

/// Output-relative HTML path of a rendered page path.
///
/// `blog/a` → `blog/a/index.html`, `` → `index.html`
pub fn page_file(rendered: &str) -> PathBuf {
    rendered_dir(rendered).join("index.html")
}

/// Output-relative path of the entry script next to a rendered page.
pub fn entry_file(rendered: &str, file_name: &str) -> PathBuf {
    rendered_dir(rendered).join(file_name)
}

fn rendered_dir(rendered: &str) -> PathBuf {
    PathBuf::from(crate::utils::path::trim_slashes(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_page_and_entry_files() {
        assert_eq!(page_file("blog/a"), PathBuf::from("blog/a/index.html"));
        assert_eq!(page_file("/about/"), PathBuf::from("about/index.html"));
        assert_eq!(page_file(""), PathBuf::from("index.html"));
        assert_eq!(entry_file("blog/a", "entry.js"), PathBuf::from("blog/a/entry.js"));
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_records() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(&dir.path().join("public")).unwrap();

        let path = writer
            .write(ArtifactKind::Page, "blog", &page_file("blog/a"), "<p>a</p>")
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "<p>a</p>");
        assert!(path.starts_with(writer.root()));
        assert_eq!(writer.ledger().records(ArtifactKind::Page, "blog").len(), 1);
    }

    #[tokio::test]
    async fn test_escape_fails_before_mutation() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(&dir.path().join("public")).unwrap();

        let err = writer
            .write(ArtifactKind::SiteFile, "p", Path::new("../escaped/x.txt"), "x")
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::OutsideRoot { .. }));
        assert!(!dir.path().join("escaped").exists());
        assert_eq!(writer.ledger().count(ArtifactKind::SiteFile), 0);
    }

    #[tokio::test]
    async fn test_absolute_target_outside_rejected() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(&dir.path().join("public")).unwrap();
        let outside = dir.path().join("other.txt");

        assert!(writer.write(ArtifactKind::SiteFile, "p", &outside, "x").await.is_err());
        assert!(!outside.exists());
    }
}

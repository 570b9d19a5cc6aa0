//! Temporary site fixtures for tests.

use crate::{
    compiler::{RunReport, run},
    config::SiteConfig,
    script::ScriptKind,
    site::Site,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub site: Arc<Site>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config("")
    }

    /// A site rooted in a fresh temp dir, configured by `toml`, with an
    /// empty cache.
    pub fn with_config(toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();

        let mut config = SiteConfig::from_str(toml).unwrap();
        config.resolve_paths(&root);
        config.validate().unwrap();
        fs::create_dir_all(&config.build.pages).unwrap();
        fs::create_dir_all(&config.build.data).unwrap();

        let site = Arc::new(Site::open(config, true).unwrap());
        Self { dir, site }
    }

    pub fn write_page(&self, relative: &str, content: &str) -> PathBuf {
        write(&self.site.config.build.pages.join(relative), content)
    }

    pub fn write_data(&self, relative: &str, content: &str) -> PathBuf {
        write(&self.site.config.build.data.join(relative), content)
    }

    pub fn write_hook(&self, kind: ScriptKind, content: &str) -> PathBuf {
        let scripts = &self.site.config.scripts;
        let path = match kind {
            ScriptKind::PostGenerate => &scripts.post_generate,
            _ => &scripts.pre_generate,
        };
        write(path, content)
    }

    /// Contents of an output file, `None` if it was never written.
    pub fn read_output(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.site.writer.root().join(relative)).ok()
    }

    /// Scan every page (all must succeed) and run once.
    pub async fn build(&self) -> RunReport {
        assert_eq!(self.site.scan_all().await, 0, "every page should scan");
        run(&self.site).await.unwrap()
    }
}

fn write(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    path.to_path_buf()
}

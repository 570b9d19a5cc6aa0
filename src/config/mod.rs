//! Site configuration management for `site.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[build]`   | Pages, data, output and cache locations           |
//! | `[scripts]` | Pre/post generation hooks, watchdog, op limits    |
//! | `[cache]`   | Cache group policy                                |
//! | `[watch]`   | Debounce window for incremental rebuilds          |
//!
//! # Example
//!
//! ```toml
//! [build]
//! pages = "pages"
//! output = "public"
//!
//! [scripts]
//! watchdog_ms = 3000
//!
//! [watch]
//! debounce_ms = 300
//! ```

mod build;
pub mod defaults;
mod error;
mod scripts;

pub use build::{BuildConfig, CacheConfig};
pub use error::ConfigError;
pub use scripts::{ScriptsConfig, WatchConfig};

use crate::cli::Cli;
use crate::utils::path::normalize_path;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing site.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load, apply CLI overrides, resolve paths and validate.
    ///
    /// A missing config file is not an error: every field has a default.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.config_path = normalize_path(&config_path);

        if let Some(output) = &cli.output {
            config.build.output = output.clone();
        }

        let root = cli
            .root
            .clone()
            .or_else(|| config.build.root.clone())
            .unwrap_or(root);
        config.resolve_paths(&root);
        config.validate()?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Resolve every configured path against `root` and normalize to absolute.
    pub fn resolve_paths(&mut self, root: &Path) {
        let root = normalize_path(root);

        let build = &mut self.build;
        build.pages = normalize_path(&root.join(&build.pages));
        build.data = normalize_path(&root.join(&build.data));
        build.output = normalize_path(&root.join(&build.output));
        build.cache = normalize_path(&root.join(&build.cache));

        let scripts = &mut self.scripts;
        scripts.pre_generate = normalize_path(&root.join(&scripts.pre_generate));
        scripts.post_generate = normalize_path(&root.join(&scripts.post_generate));

        self.build.root = Some(root);
    }

    /// Validate resolved configuration.
    ///
    /// Overlapping directory roots are rejected: a page written into the
    /// pages directory would be rescanned as a source, and data files inside
    /// the output root would be watched as inputs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("pages", &self.build.pages),
            ("data", &self.build.data),
            ("output", &self.build.output),
        ];

        for (i, (name_a, a)) in dirs.iter().enumerate() {
            for (name_b, b) in &dirs[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(ConfigError::Overlap(
                        *name_a,
                        *name_b,
                        (*a).clone(),
                        (*b).clone(),
                    ));
                }
            }
        }

        if self.scripts.watchdog_ms == 0 {
            return Err(ConfigError::Validation(
                "[scripts.watchdog_ms] must be greater than zero".into(),
            ));
        }

        if self.build.entry_file.is_empty() || self.build.entry_file.contains('/') {
            return Err(ConfigError::Validation(
                "[build.entry_file] must be a plain file name".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(root: &Path, toml: &str) -> SiteConfig {
        let mut config = SiteConfig::from_str(toml).unwrap();
        config.resolve_paths(root);
        config
    }

    #[test]
    fn test_resolve_paths_absolute() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "");
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.build.pages, root.join("pages"));
        assert_eq!(config.build.output, root.join("public"));
        assert_eq!(config.scripts.pre_generate, root.join("hooks/pre-generate.rhai"));
        assert_eq!(config.get_root(), root);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "[build]\noutput = \"pages/out\"");

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Overlap("pages", "output", _, _)));
    }

    #[test]
    fn test_identical_roots_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "[build]\ndata = \"site\"\noutput = \"site\"");
        assert!(matches!(config.validate(), Err(ConfigError::Overlap(..))));
    }

    #[test]
    fn test_zero_watchdog_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "[scripts]\nwatchdog_ms = 0");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_with_cli_overrides() {
        use clap::Parser;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("site.toml"), "[build]\ndata = \"content\"").unwrap();

        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["inkwell", "--root", root, "--output", "dist", "build"]);
        let config = SiteConfig::load(&cli).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.build.data, root.join("content"));
        assert_eq!(config.build.output, root.join("dist"));
        assert_eq!(config.config_path, root.join("site.toml"));
    }
}

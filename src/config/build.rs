//! `[build]` and `[cache]` section configuration.
//!
//! Contains the directory layout of a site and the cache policy.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in site.toml - directory layout.
///
/// # Example
/// ```toml
/// [build]
/// pages = "pages"      # Template sources
/// data = "data"        # Data directory exposed to scripts
/// output = "public"    # Output root; nothing is written outside of it
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Template source directory.
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: PathBuf,

    /// Data directory, resolved for `data_files()` in scripts.
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: PathBuf,

    /// Output root.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Persisted cache file.
    #[serde(default = "defaults::build::cache")]
    #[educe(Default = defaults::build::cache())]
    pub cache: PathBuf,

    /// File name of the composed entry script next to each rendered page.
    #[serde(default = "defaults::build::entry_file")]
    #[educe(Default = defaults::build::entry_file())]
    pub entry_file: String,

    /// Output subdirectory for verbatim `lib` blocks.
    #[serde(default = "defaults::build::lib_dir")]
    #[educe(Default = defaults::build::lib_dir())]
    pub lib_dir: PathBuf,
}

/// `[cache]` section in site.toml.
///
/// ```toml
/// [cache]
/// isolate = true   # one cache group per page instead of one shared group
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub isolate: bool,
}

//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("[build.{}] `{}` overlaps [build.{}] `{}`", .0, .2.display(), .1, .3.display())]
    Overlap(&'static str, &'static str, PathBuf, PathBuf),
}

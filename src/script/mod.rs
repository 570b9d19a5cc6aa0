//! Sandboxed execution of generate scripts and hooks.
//!
//! # Capabilities
//!
//! | Binding               | Generate | Pre hook | Post hook |
//! |-----------------------|:--------:|:--------:|:---------:|
//! | `resolve` / `reject`  |    ✓     |    ✓     |     ✓     |
//! | `cache`               |    ✓     |    ✓     |     ✓     |
//! | `log` / `print`       |    ✓     |    ✓     |     ✓     |
//! | `data_dir`            |    ✓     |    ✓     |     ✓     |
//! | `data_files`          |    ✓     |    ✓     |     ✓     |
//! | `read_data_file`      |    ✓     |    ✓     |     ✓     |
//! | `parse_front_matter`  |    ✓     |    ✓     |     ✓     |
//! | `inputs`, `global`    |    ✓     |          |           |
//! | `generate_pages`      |    ✓     |          |           |
//! | `render_template`     |    ✓     |          |           |
//! | `ledger`              |          |          |     ✓     |
//!
//! Each invocation gets a fresh engine and scope. Nothing from the host is
//! reachable except the bindings above.

mod response;
mod sandbox;
pub mod source;

pub use response::{Response, site_file_contents};
pub use sandbox::{ScriptLane, execute};

use crate::{
    compiler::render::RenderError,
    content::FrontMatter,
    data::{CacheGroup, GlobalAccess},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

/// Owner name of the pre-generation hook in caches, ledgers and logs.
pub const PRE_HOOK: &str = "@pre-generate";
/// Owner name of the post-generation hook.
pub const POST_HOOK: &str = "@post-generate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Generate,
    PreGenerate,
    PostGenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    Added,
    Modified,
    Deleted,
}

/// The change that caused a page to be queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub path: PathBuf,
    pub reason: ChangeReason,
}

/// One page requested through `generate_pages`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchEntry {
    /// Substituted for the wildcard of the `generate` target.
    pub path: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Synchronous rendering exposed to scripts as `render_template`.
pub trait RenderCapability: Send + Sync {
    fn render(&self, page: &str, data: &Value) -> Result<String, RenderError>;
}

/// Everything one script run needs. Moved into the blocking task.
pub struct Invocation {
    pub kind: ScriptKind,
    /// Page name, or [`PRE_HOOK`] / [`POST_HOOK`].
    pub owner: String,
    pub source: String,
    pub front_matter: FrontMatter,
    pub trigger: Option<Trigger>,
    pub global: Option<GlobalAccess>,
    pub cache: CacheGroup,
    pub data_dir: PathBuf,
    pub renderer: Option<Arc<dyn RenderCapability>>,
    pub ledger: Option<Value>,
    /// Engine operation limit, 0 for none.
    pub max_operations: u64,
}

impl Invocation {
    /// An invocation with no inputs, for hooks and tests.
    pub fn new(kind: ScriptKind, owner: &str, source: &str, data_dir: PathBuf) -> Self {
        Self {
            kind,
            owner: owner.to_string(),
            source: source.to_string(),
            front_matter: FrontMatter::new(),
            trigger: None,
            global: None,
            cache: CacheGroup::new(),
            data_dir,
            renderer: None,
            ledger: None,
            max_operations: 0,
        }
    }
}

/// A settled, resolved script.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub response: Response,
    /// The cache group after the run: `response.cache` if given, otherwise
    /// the `cache` binding as the script left it.
    pub cache: CacheGroup,
    /// `None` if `generate_pages` was never called.
    pub batch: Option<Vec<BatchEntry>>,
    /// Files read through `read_data_file`.
    pub read_files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("`{owner}` rejected: {message}{context}")]
    Rejected {
        owner: String,
        message: String,
        context: String,
    },

    #[error("`{owner}` failed: {message}{context}")]
    Runtime {
        owner: String,
        message: String,
        context: String,
    },

    #[error("`{owner}` finished without calling resolve or reject")]
    Unresolved { owner: String },

    #[error("`{owner}` resolved with an invalid response: {message}")]
    InvalidResponse { owner: String, message: String },

    #[error("`{owner}` did not run to completion: {message}")]
    Aborted { owner: String, message: String },
}

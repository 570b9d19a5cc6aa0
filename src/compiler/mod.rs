//! Generation pipeline: dependency tracking, rendering and orchestration.
//!
//! - **deps**: Reverse dependency indexes for precise regeneration
//! - **queue**: Pending generation requests, coalesced per page
//! - **render**: Wrapper-aware recursive renderer
//! - **batch**: Expansion of `generate` targets into render paths
//! - **entry**: Entry script composition along the wrapper chain
//! - **generate**: One run: hooks, scripts, renders, fan-in
//! - **watch**: Mapping changed paths to pages and re-running
//!
//! # Run Flow
//!
//! ```text
//! pre hook ──► drain queue ──► script / direct render ──► batch renders ──► post hook
//!    │                               │                         │
//!    ▼                               ▼                         ▼
//!  global                  cache, deps, site files       HTML + entry files
//! ```

pub mod barrier;
pub mod batch;
pub mod deps;
pub mod entry;
pub mod generate;
pub mod queue;
pub mod render;
pub mod watch;

pub use generate::{RunReport, run};
pub use watch::{ChangeSet, apply_changes};

use crate::{data::CacheError, output::WriteError, script::ScriptError};
use render::RenderError;
use std::{error::Error as StdError, path::PathBuf};
use thiserror::Error;

/// Failure of one generation request or hook.
///
/// Only [`GenerateError::Cache`] aborts a run; everything else is logged and
/// counted against the request that caused it.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("`{page}` failed to render")]
    Render {
        page: String,
        #[source]
        source: RenderError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("`{page}`: {message}")]
    Validation { page: String, message: String },

    #[error("`{page}` uses the generate script of `{reference}`, which has none")]
    MissingReference { page: String, reference: String },

    #[error("failed to read hook `{}`", .0.display())]
    HookIo(PathBuf, #[source] std::io::Error),
}

/// An error followed by its sources, `: `-separated, for one log line.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

//! Page sources: front matter, script blocks and compiled templates.

pub mod page;
pub mod scan;
pub mod store;

pub use page::{FrontMatter, Page};
pub use store::ContentStore;

use crate::{output::WriteError, template::TemplateError};
use std::path::PathBuf;
use thiserror::Error;

/// A page source could not be scanned. Only that page is affected.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("`{}` is not inside the pages directory", .0.display())]
    NotAPage(PathBuf),

    #[error("failed to read page source `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{page}: invalid front matter: {message}")]
    FrontMatter { page: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to write lib file")]
    Lib(#[from] WriteError),
}

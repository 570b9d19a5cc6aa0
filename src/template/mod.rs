//! Pluggable template compilation.
//!
//! The engine never interprets template text itself. A [`TemplateCompiler`]
//! turns the body of a page (front matter and script blocks already stripped)
//! into a [`Template`], and the renderer drives that template through a
//! [`RenderHost`] which supplies wrapped content and included pages.
//!
//! [`BraceCompiler`] is the built-in implementation.

mod brace;

pub use brace::BraceCompiler;

use crate::compiler::render::RenderError;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;

/// Template text could not be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{page}:{line}: {message}")]
pub struct TemplateError {
    pub page: String,
    pub line: usize,
    pub message: String,
}

/// Callbacks a template uses for the parts it cannot render on its own.
pub trait RenderHost {
    /// Render whatever this template is wrapping.
    fn body(&mut self) -> Result<String, RenderError>;

    /// Render another page in place. `data` takes precedence over the
    /// included page's front matter.
    fn include(&mut self, page: &str, data: Option<&Value>) -> Result<String, RenderError>;
}

/// A compiled, callable template.
pub trait Template: Send + Sync + Debug {
    fn render(&self, data: &Value, host: &mut dyn RenderHost) -> Result<String, RenderError>;
}

pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, page: &str, source: &str) -> Result<Arc<dyn Template>, TemplateError>;
}

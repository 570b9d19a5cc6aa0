//! Wrapper-aware recursive renderer.
//!
//! # Wrapper chains
//!
//! ```text
//! A (wrapper: B) ─► B (wrapper: C) ─► C
//!
//! stack = [A, B, C]            pop C, render C
//!                                   └── {{@body}} ─► pop B, render B
//!                                                       └── {{@body}} ─► pop A, render A
//! ```
//!
//! The [`RenderContext`] is moved into each nested render and handed back,
//! never shared. A body slot reached with an empty stack is an error.
//!
//! # Dependencies
//!
//! Wrapping and including both record a template edge: editing `C` reaches
//! `B`, and through `B`, `A`.

use super::deps::{DepKey, SharedTracker};
use crate::{
    content::{ContentStore, FrontMatter, Page},
    template::RenderHost,
};
use serde_json::{Map, Value};
use std::{mem, sync::Arc};
use thiserror::Error;

/// Nesting limit for includes, which would otherwise recurse forever on a
/// page that includes itself.
pub const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("page `{0}` does not exist")]
    MissingPage(String),

    #[error("wrapper cycle: {}", .0.join(" -> "))]
    WrapperCycle(Vec<String>),

    #[error("`{0}`: wrapper was not wrapping anything")]
    UnwrappedBody(String),

    #[error("`{0}`: includes nested deeper than {MAX_INCLUDE_DEPTH}")]
    IncludeDepth(String),

    #[error("`{page}`: data passed to include `{include}` is not an object")]
    IncludeData { page: String, include: String },
}

/// Progress of one render: the wrappers not yet entered and the data the
/// render was called with.
#[derive(Debug, Default)]
pub struct RenderContext {
    /// Innermost first; the next page to render is at the end.
    stack: Vec<Arc<Page>>,
    call_data: Value,
    /// Highest-precedence data for the next page (include data).
    overlay: Option<Value>,
    depth: usize,
}

pub struct Renderer<'a> {
    store: &'a ContentStore,
    tracker: &'a SharedTracker,
}

impl<'a> Renderer<'a> {
    pub const fn new(store: &'a ContentStore, tracker: &'a SharedTracker) -> Self {
        Self { store, tracker }
    }

    /// `name` followed by its wrappers, innermost to outermost.
    ///
    /// Records `wrapper → wrapped` edges as it walks, including the edge to a
    /// wrapper that does not exist yet, so creating it later regenerates the
    /// page.
    pub fn wrapper_chain(&self, name: &str) -> Result<Vec<Arc<Page>>, RenderError> {
        let mut page = self
            .store
            .get(name)
            .ok_or_else(|| RenderError::MissingPage(name.to_string()))?;
        let mut chain = vec![Arc::clone(&page)];

        while let Some(wrapper) = page.wrapper() {
            let _ = self
                .tracker
                .write()
                .record(DepKey::Template(wrapper.to_string()), &page.name);

            if chain.iter().any(|p| p.name == wrapper) {
                let mut names: Vec<_> = chain.iter().map(|p| p.name.clone()).collect();
                names.push(wrapper.to_string());
                return Err(RenderError::WrapperCycle(names));
            }

            let next = self
                .store
                .get(wrapper)
                .ok_or_else(|| RenderError::MissingPage(wrapper.to_string()))?;
            chain.push(Arc::clone(&next));
            page = next;
        }
        Ok(chain)
    }

    /// Render `name` inside its wrappers.
    pub fn render_page(&self, name: &str, call_data: &Value) -> Result<String, RenderError> {
        let stack = self.wrapper_chain(name)?;
        self.render_chain(stack, call_data)
    }

    /// Render an already resolved chain (as returned by [`Self::wrapper_chain`]).
    pub fn render_chain(
        &self,
        stack: Vec<Arc<Page>>,
        call_data: &Value,
    ) -> Result<String, RenderError> {
        let context = RenderContext {
            stack,
            call_data: call_data.clone(),
            overlay: None,
            depth: 0,
        };
        self.render_next(context).map(|(out, _)| out)
    }

    /// Pop the next page off the stack and render it.
    fn render_next(
        &self,
        mut context: RenderContext,
    ) -> Result<(String, RenderContext), RenderError> {
        let Some(page) = context.stack.pop() else {
            return Err(RenderError::UnwrappedBody(String::new()));
        };
        let data = layer(&context.call_data, &page.front_matter, context.overlay.take());

        let mut host = Host {
            renderer: self,
            page: Arc::clone(&page),
            context,
        };
        let out = page.template.render(&data, &mut host)?;
        Ok((out, host.context))
    }
}

struct Host<'r, 'a> {
    renderer: &'r Renderer<'a>,
    /// The page whose template is currently rendering.
    page: Arc<Page>,
    context: RenderContext,
}

impl RenderHost for Host<'_, '_> {
    fn body(&mut self) -> Result<String, RenderError> {
        if self.context.stack.is_empty() {
            return Err(RenderError::UnwrappedBody(self.page.name.clone()));
        }
        let context = mem::take(&mut self.context);
        let (out, context) = self.renderer.render_next(context)?;
        self.context = context;
        Ok(out)
    }

    fn include(&mut self, name: &str, data: Option<&Value>) -> Result<String, RenderError> {
        if self.context.depth >= MAX_INCLUDE_DEPTH {
            return Err(RenderError::IncludeDepth(self.page.name.clone()));
        }
        let _ = self
            .renderer
            .tracker
            .write()
            .record(DepKey::Template(name.to_string()), &self.page.name);

        let included = self
            .renderer
            .store
            .get(name)
            .ok_or_else(|| RenderError::MissingPage(name.to_string()))?;

        let overlay = match data {
            None => None,
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(_) => {
                return Err(RenderError::IncludeData {
                    page: self.page.name.clone(),
                    include: name.to_string(),
                });
            }
        };

        let context = RenderContext {
            stack: vec![included],
            call_data: self.context.call_data.clone(),
            overlay,
            depth: self.context.depth + 1,
        };
        self.renderer.render_next(context).map(|(out, _)| out)
    }
}

/// Merge render data: call data < front matter < overlay.
fn layer(call_data: &Value, front_matter: &FrontMatter, overlay: Option<Value>) -> Value {
    let mut merged = match call_data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    merged.extend(front_matter.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(Value::Object(map)) = overlay {
        merged.extend(map);
    }
    Value::Object(merged)
}

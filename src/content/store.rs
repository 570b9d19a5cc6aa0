//! In-memory store of scanned pages keyed by page name.

use super::page::Page;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ContentStore {
    pages: FxHashMap<String, Arc<Page>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a page. Returns the previous version, if any.
    pub fn insert(&mut self, page: Page) -> Option<Arc<Page>> {
        self.pages.insert(page.name.clone(), Arc::new(page))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Page>> {
        self.pages.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Page>> {
        self.pages.remove(name)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Sorted page names.
    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pages.keys().cloned().collect();
        names.sort();
        names
    }

    /// The generate script `page` runs: its own, or the one it references.
    ///
    /// Returns the owning page name with the body. `None` if the page has no
    /// script at all; `Some(Err(reference))` if it references a page without
    /// a generate script.
    pub fn generate_script(&self, page: &Page) -> Option<Result<(String, String), String>> {
        if let Some(body) = &page.scripts.generate {
            return Some(Ok((page.name.clone(), body.clone())));
        }
        let reference = page.scripts.generate_use.as_ref()?;
        let script = self
            .pages
            .get(reference)
            .and_then(|owner| owner.scripts.generate.clone())
            .map(|body| (reference.clone(), body))
            .ok_or_else(|| reference.clone());
        Some(script)
    }
}

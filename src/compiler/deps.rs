//! Reverse dependency indexes for precise incremental rebuilds.
//!
//! Four indexes map a resource key to the set of pages that must regenerate
//! when that resource changes:
//!
//! | Index     | Key                         | Recorded by                       |
//! |-----------|-----------------------------|-----------------------------------|
//! | templates | page name                   | renderer (wrappers, includes)     |
//! | files     | absolute file path          | `watch_files`, `read_data_file`   |
//! | globs     | glob pattern                | `watch_globs`                     |
//! | global    | (single flat set)           | instrumented `global.get(..)`     |
//!
//! Edges are idempotent. Path lookups try the exact file index first, then
//! every registered glob in registration order; the first matching glob wins.

use globset::{GlobBuilder, GlobMatcher};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::{
    collections::{BTreeSet, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Tracker handle shared between the engine and running scripts.
pub type SharedTracker = Arc<RwLock<DependencyTracker>>;

/// Sorted set of dependent page names.
pub type Dependents = BTreeSet<String>;

/// A resource a page can depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepKey {
    Template(String),
    File(PathBuf),
    Glob(String),
    Global,
}

struct GlobEntry {
    pattern: String,
    matcher: GlobMatcher,
    dependents: Dependents,
}

#[derive(Default)]
pub struct DependencyTracker {
    templates: FxHashMap<String, Dependents>,
    files: FxHashMap<PathBuf, Dependents>,
    /// Kept in registration order for first-match lookups.
    globs: Vec<GlobEntry>,
    global: Dependents,
}

impl std::fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("templates", &self.templates)
            .field("files", &self.files)
            .field(
                "globs",
                &self.globs.iter().map(|g| &g.pattern).collect::<Vec<_>>(),
            )
            .field("global", &self.global)
            .finish()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTracker {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record that `page` depends on `key`.
    ///
    /// Returns `Ok(true)` if the edge is new. Only glob keys can fail, when
    /// the pattern does not compile.
    pub fn record(&mut self, key: DepKey, page: &str) -> Result<bool, globset::Error> {
        let inserted = match key {
            DepKey::Template(name) => self
                .templates
                .entry(name)
                .or_default()
                .insert(page.to_string()),
            DepKey::File(path) => self.files.entry(path).or_default().insert(page.to_string()),
            DepKey::Glob(pattern) => {
                if let Some(entry) = self.globs.iter_mut().find(|g| g.pattern == pattern) {
                    entry.dependents.insert(page.to_string())
                } else {
                    let matcher = GlobBuilder::new(&pattern)
                        .literal_separator(true)
                        .build()?
                        .compile_matcher();
                    self.globs.push(GlobEntry {
                        pattern,
                        matcher,
                        dependents: BTreeSet::from([page.to_string()]),
                    });
                    true
                }
            }
            DepKey::Global => self.global.insert(page.to_string()),
        };
        Ok(inserted)
    }

    /// Dependents of `key`, or `None` if nothing depends on it.
    ///
    /// File keys fall back to glob matching when there is no exact entry.
    pub fn dependents_of(&self, key: &DepKey) -> Option<&Dependents> {
        let found = match key {
            DepKey::Template(name) => self.templates.get(name),
            DepKey::File(path) => return self.dependents_of_path(path),
            DepKey::Glob(pattern) => self
                .globs
                .iter()
                .find(|g| &g.pattern == pattern)
                .map(|g| &g.dependents),
            DepKey::Global => Some(&self.global),
        };
        found.filter(|set| !set.is_empty())
    }

    /// Exact file match first, then the first registered glob matching `path`.
    pub fn dependents_of_path(&self, path: &Path) -> Option<&Dependents> {
        if let Some(set) = self.files.get(path).filter(|s| !s.is_empty()) {
            return Some(set);
        }
        self.globs
            .iter()
            .find(|g| !g.dependents.is_empty() && g.matcher.is_match(path))
            .map(|g| &g.dependents)
    }

    /// Every page reachable through the template index from `name`.
    ///
    /// A wrapper of a wrapper reaches the innermost wrapped page, so editing
    /// a shared layout regenerates everything beneath it. `name` itself is
    /// not included unless a cycle leads back to it.
    pub fn template_dependents(&self, name: &str) -> Dependents {
        let mut seen = Dependents::new();
        let mut queue = VecDeque::from([name.to_string()]);

        while let Some(current) = queue.pop_front() {
            let Some(direct) = self.templates.get(&current) else {
                continue;
            };
            for dependent in direct {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }
        seen
    }

    /// Every file some page depends on.
    pub fn watched_files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Pages that read global data.
    pub fn global_dependents(&self) -> &Dependents {
        &self.global
    }

    /// Remove `page` from every index. Always succeeds.
    pub fn remove_page(&mut self, page: &str) {
        self.templates.retain(|_, set| {
            set.remove(page);
            !set.is_empty()
        });
        self.files.retain(|_, set| {
            set.remove(page);
            !set.is_empty()
        });
        self.globs.retain_mut(|g| {
            g.dependents.remove(page);
            !g.dependents.is_empty()
        });
        self.global.remove(page);
    }

    /// Whether `page` appears as a dependent anywhere.
    #[cfg(test)]
    pub fn mentions(&self, page: &str) -> bool {
        self.templates.values().any(|s| s.contains(page))
            || self.files.values().any(|s| s.contains(page))
            || self.globs.iter().any(|g| g.dependents.contains(page))
            || self.global.contains(page)
    }
}

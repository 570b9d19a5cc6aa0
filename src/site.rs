//! Engine state for one site.
//!
//! Everything a run reads or mutates lives in one [`Site`], shared behind an
//! `Arc` between the orchestrator, running scripts and the watcher. There is
//! no process-wide state.
//!
//! | Field     | Lock            | Writers                                   |
//! |-----------|-----------------|-------------------------------------------|
//! | `pages`   | `RwLock`        | scanner, page removal                     |
//! | `tracker` | `RwLock`        | renderer, script responses, global reads  |
//! | `cache`   | `Mutex`         | orchestrator, after a script settles      |
//! | `global`  | internal        | pre-generation hook                       |
//! | `queue`   | `Mutex`         | scanner, coordinator, global changes      |

use crate::{
    compiler::{
        deps::{DependencyTracker, SharedTracker},
        queue::{GenerationQueue, Request},
    },
    config::SiteConfig,
    content::{ContentStore, ScanError, scan::scan_source},
    data::{CacheError, CacheStore, GlobalStore, GroupPolicy},
    log,
    output::{ArtifactKind, OutputWriter, WriteError},
    script::{ScriptLane, Trigger},
    template::{BraceCompiler, TemplateCompiler},
    utils::path::{is_temp_file, page_name},
};
use parking_lot::{Mutex, RwLock};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

pub struct Site {
    pub config: SiteConfig,
    pub pages: RwLock<ContentStore>,
    pub tracker: SharedTracker,
    pub cache: Mutex<CacheStore>,
    pub global: GlobalStore,
    pub queue: Mutex<GenerationQueue>,
    pub writer: OutputWriter,
    pub lane: ScriptLane,
    compiler: Arc<dyn TemplateCompiler>,
}

impl Site {
    /// Open a site with the built-in template syntax, loading the persisted
    /// cache unless `no_cache` is set.
    pub fn open(config: SiteConfig, no_cache: bool) -> Result<Self, WriteError> {
        let policy = if config.cache.isolate {
            GroupPolicy::PerPage
        } else {
            GroupPolicy::Shared
        };
        let cache = if no_cache {
            CacheStore::empty(&config.build.cache, policy)
        } else {
            CacheStore::load(&config.build.cache, policy)
        };
        Self::with_compiler(config, cache, Arc::new(BraceCompiler))
    }

    pub fn with_compiler(
        config: SiteConfig,
        cache: CacheStore,
        compiler: Arc<dyn TemplateCompiler>,
    ) -> Result<Self, WriteError> {
        let writer = OutputWriter::new(&config.build.output)?;
        Ok(Self {
            config,
            pages: RwLock::new(ContentStore::new()),
            tracker: DependencyTracker::shared(),
            cache: Mutex::new(cache),
            global: GlobalStore::default(),
            queue: Mutex::new(GenerationQueue::default()),
            writer,
            lane: ScriptLane::default(),
            compiler,
        })
    }

    /// Page name of a source file, if it lives in the pages directory.
    pub fn page_name_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.config.build.pages).ok()?;
        let name = page_name(relative);
        (!name.is_empty()).then_some(name)
    }

    /// Whether `path` is one of the hook scripts.
    pub fn is_hook(&self, path: &Path) -> bool {
        let scripts = &self.config.scripts;
        path == scripts.pre_generate || path == scripts.post_generate
    }

    /// Scan one page source, store it, write its lib block and queue it if
    /// it declares a `generate` target. Returns the page name.
    pub async fn scan_page(&self, path: &Path, trigger: Option<Trigger>) -> Result<String, ScanError> {
        let name = self
            .page_name_of(path)
            .ok_or_else(|| ScanError::NotAPage(path.to_path_buf()))?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScanError::Io(path.to_path_buf(), e))?;
        let page = scan_source(&name, path, &content, self.compiler.as_ref())?;

        if let Some(lib) = &page.scripts.lib {
            let target = self.config.build.lib_dir.join(format!("{name}.js"));
            self.writer.write(ArtifactKind::Lib, &name, &target, lib).await?;
        }

        let has_target = page.target().is_some();
        self.pages.write().insert(page);
        if has_target {
            self.queue_page(&name, trigger);
        }
        Ok(name)
    }

    /// Scan every page source. Returns the number of pages that failed.
    pub async fn scan_all(&self) -> usize {
        let mut failures = 0;
        for path in collect_page_files(&self.config.build.pages) {
            if let Err(e) = self.scan_page(&path, None).await {
                log!("error"; "{}", crate::compiler::error_chain(&e));
                failures += 1;
            }
        }
        failures
    }

    /// Queue `name` for generation if it exists and has a `generate` target.
    pub fn queue_page(&self, name: &str, trigger: Option<Trigger>) -> bool {
        let Some(target) = self
            .pages
            .read()
            .get(name)
            .and_then(|page| page.target().map(str::to_string))
        else {
            return false;
        };
        self.queue.lock().push(Request {
            page: name.to_string(),
            target,
            trigger,
        })
    }

    /// Forget a page everywhere: store, dependency indexes, queue, its own
    /// cache group and its ledger records. Safe to call repeatedly.
    pub fn remove_page(&self, name: &str) {
        self.pages.write().remove(name);
        self.tracker.write().remove_page(name);
        self.queue.lock().remove_page(name);
        self.cache.lock().remove_owner(name);
        self.writer.ledger().remove_page(name);
    }

    pub fn save_cache(&self) -> Result<(), CacheError> {
        self.cache.lock().save()
    }
}

/// All page sources under `dir`, sorted, skipping editor artifacts.
fn collect_page_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !is_temp_file(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

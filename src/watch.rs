//! File system watcher for incremental regeneration.
//!
//! Monitors the pages directory, the data directory and the hook scripts and
//! hands every debounced batch of changes to the coordinator. Files recorded
//! through `watch_files` outside those directories get a watch on their
//! parent directory once a run has recorded them.
//!
//! # Relationship with `compiler/watch.rs`
//!
//! - **This module** (`src/watch.rs`): Event loop, debouncing, status line
//! - **`compiler/watch.rs`**: Change resolution via [`apply_changes`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    apply_changes()     │  │
//! │  │ events   │    │ (300ms)  │    │  rescan / remove pages │  │
//! │  └──────────┘    └──────────┘    │  queue dependents, run │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    compiler::{ChangeSet, apply_changes, error_chain},
    config::SiteConfig,
    log,
    logger::WatchStatus,
    script::ChangeReason,
    site::Site,
    utils::path::{is_temp_file, normalize_path},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::runtime::Runtime;

/// Idle wait between events when nothing is pending.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events until the debounce window passes quietly.
struct Debouncer {
    pending: ChangeSet,
    last_event: Option<Instant>,
    window: Duration,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            pending: ChangeSet::default(),
            last_event: None,
            window,
        }
    }

    fn add(&mut self, event: Event) {
        let Some(reason) = change_reason(&event.kind) else {
            return;
        };
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.record(normalize_path(&path), reason);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty() && self.last_event.is_some_and(|t| t.elapsed() >= self.window)
    }

    fn take(&mut self) -> ChangeSet {
        self.last_event = None;
        std::mem::take(&mut self.pending)
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            IDLE_TIMEOUT
        } else {
            self.window
        }
    }
}

const fn change_reason(kind: &EventKind) -> Option<ChangeReason> {
    match kind {
        EventKind::Create(_) => Some(ChangeReason::Added),
        EventKind::Modify(_) => Some(ChangeReason::Modified),
        EventKind::Remove(_) => Some(ChangeReason::Deleted),
        _ => None,
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Format path as relative to root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn handle_changes(site: &Arc<Site>, runtime: &Runtime, changes: ChangeSet, status: &mut WatchStatus) {
    let root = site.config.get_root();
    let trigger = changes
        .paths()
        .map(|p| rel_path(p, root))
        .collect::<Vec<_>>()
        .join(", ");

    match runtime.block_on(apply_changes(site, changes)) {
        Ok(report) if report.errors == 0 => status.success(&format!(
            "{trigger}: regenerated {} of {} queued pages",
            report.rendered, report.requested
        )),
        Ok(report) => {
            status.error(
                &format!("{trigger}: {} errors", report.errors),
                &format!("rendered {} pages", report.rendered),
            );
            status.detach();
        }
        Err(err) => {
            status.error(&format!("{trigger}: generation aborted"), &error_chain(&err));
            status.detach();
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Watch the input directories, returning the directories watched
/// non-recursively.
fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<BTreeSet<PathBuf>> {
    let root = config.get_root();
    let build = &config.build;

    for dir in [&build.pages, &build.data] {
        if dir.exists() {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
        }
    }

    let scripts = &config.scripts;
    let hook_dirs: BTreeSet<PathBuf> = [&scripts.pre_generate, &scripts.post_generate]
        .into_iter()
        .filter_map(|hook| hook.parent())
        .filter(|dir| dir.exists())
        .map(Path::to_path_buf)
        .collect();
    for dir in &hook_dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch hooks in {}", dir.display()))?;
    }

    log!("watch"; "pages: {}/, data: {}/",
        rel_path(&build.pages, root),
        rel_path(&build.data, root));
    Ok(hook_dirs)
}

/// Parent directories of tracked files that no input watch covers.
fn tracked_file_dirs<'a>(
    config: &SiteConfig,
    files: impl IntoIterator<Item = &'a Path>,
) -> BTreeSet<PathBuf> {
    let build = &config.build;
    files
        .into_iter()
        .filter(|file| !file.starts_with(&build.pages) && !file.starts_with(&build.data))
        .filter_map(Path::parent)
        .filter(|dir| dir.is_dir())
        .map(Path::to_path_buf)
        .collect()
}

fn watch_tracked_files(watcher: &mut impl Watcher, site: &Site, watched: &mut BTreeSet<PathBuf>) {
    let dirs = tracked_file_dirs(&site.config, site.tracker.read().watched_files());
    for dir in dirs {
        if watched.contains(&dir) {
            continue;
        }
        match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                log!("watch"; "tracking {}/", dir.display());
                watched.insert(dir);
            }
            Err(e) => log!("watch"; "failed to watch {}: {e}", dir.display()),
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Watch inputs and regenerate affected pages until the channel closes.
pub fn watch_for_changes_blocking(site: &Arc<Site>, runtime: &Runtime) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    let mut watched = setup_watchers(&mut watcher, &site.config)?;
    watch_tracked_files(&mut watcher, site, &mut watched);

    let mut debouncer = Debouncer::new(site.config.watch.debounce());
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                handle_changes(site, runtime, debouncer.take(), &mut status);
                watch_tracked_files(&mut watcher, site, &mut watched);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    Ok(())
}

//! Incremental regeneration for watch mode.
//!
//! This module maps changed paths to the pages they affect, called by the
//! event loop in [`crate::watch`].
//!
//! # Relationship with `src/watch.rs`
//!
//! ```text
//! src/watch.rs                    compiler/watch.rs
//! ────────────────────────────    ────────────────────────────
//! • File system monitoring        • Page rescans and removals
//! • Event debouncing              • Dependency lookups
//! • Status line                   • Re-running generation
//!         │
//!         └──── calls ────────────► apply_changes()
//! ```
//!
//! # Resolution
//!
//! | Changed path          | Action                                          |
//! |-----------------------|-------------------------------------------------|
//! | page, added/modified  | rescan, queue it and its template dependents    |
//! | page, deleted         | remove it, queue its template dependents        |
//! | hook script           | nothing extra; every run re-runs the hooks      |
//! | anything else         | queue `dependents_of` its file (exact, globs)   |

use super::{
    GenerateError, RunReport,
    deps::{DepKey, Dependents},
    error_chain, run,
};
use crate::{
    log,
    script::{ChangeReason, Trigger},
    site::Site,
};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

/// Paths changed within one debounce window.
///
/// Changes are merged per path: the reason is decided when the set is
/// applied (a path that no longer exists is deleted, one created at any
/// point in the window is added). Paths are applied in sorted order, so a
/// page reached through several of them is blamed on the smallest.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Path → created during the window.
    changes: BTreeMap<PathBuf, bool>,
}

impl ChangeSet {
    pub fn record(&mut self, path: PathBuf, reason: ChangeReason) {
        *self.changes.entry(path).or_default() |= reason == ChangeReason::Added;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.changes.keys()
    }
}

/// Apply one window of changes and run generation once.
///
/// Scan failures are counted in the returned report alongside the run's
/// own failures.
pub async fn apply_changes(site: &Arc<Site>, changes: ChangeSet) -> Result<RunReport, GenerateError> {
    let mut scan_failures = 0;

    for (path, added) in changes.changes {
        if path.is_dir() || site.is_hook(&path) {
            continue;
        }
        let reason = match (path.exists(), added) {
            (false, _) => ChangeReason::Deleted,
            (true, true) => ChangeReason::Added,
            (true, false) => ChangeReason::Modified,
        };
        let trigger = Trigger {
            path: path.clone(),
            reason,
        };

        let Some(name) = site.page_name_of(&path) else {
            let dependents = site
                .tracker
                .read()
                .dependents_of(&DepKey::File(path.clone()))
                .cloned()
                .unwrap_or_default();
            queue_all(site, &dependents, &trigger);
            continue;
        };

        if reason == ChangeReason::Deleted {
            let dependents = site.tracker.read().template_dependents(&name);
            site.remove_page(&name);
            queue_all(site, &dependents, &trigger);
            continue;
        }

        if let Err(err) = site.scan_page(&path, Some(trigger.clone())).await {
            log!("error"; "{}", error_chain(&err));
            scan_failures += 1;
            continue;
        }
        let dependents = site.tracker.read().template_dependents(&name);
        queue_all(site, &dependents, &trigger);
    }

    let mut report = run(site).await?;
    report.errors += scan_failures;
    Ok(report)
}

fn queue_all(site: &Site, pages: &Dependents, trigger: &Trigger) {
    for page in pages {
        site.queue_page(page, Some(trigger.clone()));
    }
}

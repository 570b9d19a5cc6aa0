//! Global data produced by the pre-generation hook.
//!
//! The snapshot is replaced wholesale on every pre-generation run and never
//! mutated by pages. Scripts read it through [`GlobalAccess`], which records
//! which pages actually looked at global data so only those regenerate when
//! the snapshot changes.

use crate::compiler::deps::{DepKey, SharedTracker};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub type GlobalMap = Map<String, Value>;

/// A script read a key the pre-generation hook never provided.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("undefined global key `{key}` (read by `{page}`)")]
pub struct UndefinedGlobal {
    pub key: String,
    pub page: String,
}

/// Process-lifetime holder of the current global snapshot.
#[derive(Debug, Default)]
pub struct GlobalStore {
    current: RwLock<Arc<GlobalMap>>,
}

impl GlobalStore {
    pub fn snapshot(&self) -> Arc<GlobalMap> {
        Arc::clone(&self.current.read())
    }

    /// Replace the snapshot. Returns `true` if the new one differs.
    pub fn replace(&self, next: GlobalMap) -> bool {
        let mut current = self.current.write();
        if **current == next {
            return false;
        }
        *current = Arc::new(next);
        true
    }
}

/// Instrumented, read-only view of the global snapshot for one page.
#[derive(Debug, Clone)]
pub struct GlobalAccess {
    values: Arc<GlobalMap>,
    page: String,
    tracker: SharedTracker,
}

impl GlobalAccess {
    pub fn new(values: Arc<GlobalMap>, page: &str, tracker: SharedTracker) -> Self {
        Self {
            values,
            page: page.to_string(),
            tracker,
        }
    }

    /// Read `key`, recording the invoking page as a global-data dependent.
    ///
    /// Unknown keys fail without recording anything.
    pub fn get(&self, key: &str) -> Result<Value, UndefinedGlobal> {
        let Some(value) = self.values.get(key) else {
            return Err(UndefinedGlobal {
                key: key.to_string(),
                page: self.page.clone(),
            });
        };
        // Global edges never fail to record; only glob keys can.
        let _ = self.tracker.write().record(DepKey::Global, &self.page);
        Ok(value.clone())
    }

    /// Membership test. Not recorded: a page that only probes for a key has
    /// not consumed its value.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::deps::DependencyTracker;
    use serde_json::json;

    fn snapshot(value: Value) -> Arc<GlobalMap> {
        Arc::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_get_records_dependent() {
        let tracker = DependencyTracker::shared();
        let access = GlobalAccess::new(snapshot(json!({ "title": "Site" })), "home", tracker.clone());

        assert_eq!(access.get("title").unwrap(), json!("Site"));
        assert!(tracker.read().global_dependents().contains("home"));
    }

    #[test]
    fn test_undefined_key_fails_without_edge() {
        let tracker = DependencyTracker::shared();
        let access = GlobalAccess::new(snapshot(json!({})), "home", tracker.clone());

        let err = access.get("missing").unwrap_err();
        assert_eq!(err.key, "missing");
        assert_eq!(err.page, "home");
        assert!(tracker.read().global_dependents().is_empty());
    }

    #[test]
    fn test_has_does_not_record() {
        let tracker = DependencyTracker::shared();
        let access = GlobalAccess::new(snapshot(json!({ "a": 1 })), "p", tracker.clone());

        assert!(access.has("a"));
        assert!(!access.has("b"));
        assert!(tracker.read().global_dependents().is_empty());
    }

    #[test]
    fn test_store_replace_detects_change() {
        let store = GlobalStore::default();
        assert!(!store.replace(GlobalMap::new()));

        let next = json!({ "posts": 3 }).as_object().unwrap().clone();
        assert!(store.replace(next.clone()));
        assert!(!store.replace(next));
        assert_eq!(store.snapshot().get("posts"), Some(&json!(3)));
    }
}

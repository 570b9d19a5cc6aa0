//! Expiring key/value cache shared with scripts.
//!
//! The store is a map of named groups; each group maps an entry name to
//! `{ "expires": <ms since epoch>?, "data": <any> }`. Scripts receive their
//! group as a mutable map, and whatever the group looks like after the script
//! settles is written back.
//!
//! # Storage
//!
//! One JSON file, loaded once when the engine starts and written once at
//! shutdown (or on Ctrl-C):
//!
//! ```json
//! { "default": { "posts": { "expires": 1735689600000, "data": [ ... ] } } }
//! ```
//!
//! # Groups
//!
//! By default every script shares the `default` group. With
//! `[cache] isolate = true` each page gets a group named after itself.

use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Name of the group shared by every script unless groups are isolated.
pub const DEFAULT_GROUP: &str = "default";

/// One cache group: entry name → `{ expires?, data }`.
pub type CacheGroup = Map<String, Value>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Fatal: an entry's `expires` is present but not a number.
    #[error("cache entry `{group}.{key}` has a non-numeric expiry: {value}")]
    InvalidExpiry {
        group: String,
        key: String,
        value: Value,
    },

    #[error("failed to write cache file `{}`", .0.display())]
    Io(PathBuf, #[source] io::Error),

    #[error("failed to serialize cache")]
    Json(#[from] serde_json::Error),
}

/// Which group a page's scripts read and write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupPolicy {
    #[default]
    Shared,
    PerPage,
}

#[derive(Debug, Default)]
pub struct CacheStore {
    path: PathBuf,
    policy: GroupPolicy,
    groups: BTreeMap<String, CacheGroup>,
}

impl CacheStore {
    /// An empty store that will be persisted to `path`.
    pub fn empty(path: &Path, policy: GroupPolicy) -> Self {
        Self {
            path: path.to_path_buf(),
            policy,
            groups: BTreeMap::new(),
        }
    }

    /// Load the store from disk.
    ///
    /// A missing or unreadable file yields an empty store; groups that are
    /// not JSON objects are dropped.
    pub fn load(path: &Path, policy: GroupPolicy) -> Self {
        let mut store = Self::empty(path, policy);

        let Ok(content) = fs::read_to_string(path) else {
            return store;
        };
        let groups = match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(groups) => groups,
            Err(e) => {
                crate::log!("warn"; "ignoring unreadable cache file {}: {e}", path.display());
                return store;
            }
        };

        store.groups = groups
            .into_iter()
            .filter_map(|(name, group)| match group {
                Value::Object(entries) => Some((name, entries)),
                _ => None,
            })
            .collect();
        store
    }

    /// Write the store to its file.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(&self.groups)?;
        fs::write(&self.path, json).map_err(|e| CacheError::Io(self.path.clone(), e))
    }

    /// Group name used by scripts owned by `owner`.
    pub fn group_name(&self, owner: &str) -> String {
        match self.policy {
            GroupPolicy::Shared => DEFAULT_GROUP.to_string(),
            GroupPolicy::PerPage => owner.to_string(),
        }
    }

    /// Snapshot of a group (empty if it does not exist yet).
    pub fn group(&self, name: &str) -> CacheGroup {
        self.groups.get(name).cloned().unwrap_or_default()
    }

    pub fn replace_group(&mut self, name: &str, group: CacheGroup) {
        self.groups.insert(name.to_string(), group);
    }

    pub fn remove_group(&mut self, name: &str) -> bool {
        self.groups.remove(name).is_some()
    }

    /// Remove the group owned by a deleted page. Shared groups are kept.
    pub fn remove_owner(&mut self, owner: &str) -> bool {
        match self.policy {
            GroupPolicy::Shared => false,
            GroupPolicy::PerPage => self.remove_group(owner),
        }
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Drop every entry of `name` whose expiry is at or before `now_ms`.
    ///
    /// Returns how many entries were purged. A non-numeric `expires` is a
    /// fatal configuration error; `null` counts as "never expires".
    pub fn purge_expired(&mut self, name: &str, now_ms: i64) -> Result<usize, CacheError> {
        let Some(group) = self.groups.get_mut(name) else {
            return Ok(0);
        };

        #[allow(clippy::cast_precision_loss)]
        let now = now_ms as f64;
        let mut expired = Vec::new();
        for (key, entry) in group.iter() {
            let expires = match entry.get("expires") {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            let Some(at) = expires.as_f64() else {
                return Err(CacheError::InvalidExpiry {
                    group: name.to_string(),
                    key: key.clone(),
                    value: expires.clone(),
                });
            };
            if at <= now {
                expired.push(key.clone());
            }
        }

        for key in &expired {
            group.remove(key);
        }
        Ok(expired.len())
    }
}

/// Current time in milliseconds since the Unix epoch, the unit of `expires`.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn group_of(value: Value) -> CacheGroup {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_purge_expired_entries() {
        let mut store = CacheStore::empty(Path::new("cache.json"), GroupPolicy::Shared);
        store.replace_group(
            DEFAULT_GROUP,
            group_of(json!({
                "old": { "expires": 1000, "data": 1 },
                "fresh": { "expires": 5000, "data": 2 },
                "forever": { "data": 3 },
                "null": { "expires": null, "data": 4 },
            })),
        );

        let purged = store.purge_expired(DEFAULT_GROUP, 2000).unwrap();
        assert_eq!(purged, 1);

        let group = store.group(DEFAULT_GROUP);
        assert!(!group.contains_key("old"));
        assert!(group.contains_key("fresh"));
        assert!(group.contains_key("forever"));
        assert!(group.contains_key("null"));
    }

    #[test]
    fn test_non_numeric_expiry_is_fatal() {
        let mut store = CacheStore::empty(Path::new("cache.json"), GroupPolicy::Shared);
        store.replace_group(
            DEFAULT_GROUP,
            group_of(json!({ "bad": { "expires": "tomorrow", "data": 1 } })),
        );

        let err = store.purge_expired(DEFAULT_GROUP, 0).unwrap_err();
        match err {
            CacheError::InvalidExpiry { group, key, .. } => {
                assert_eq!(group, DEFAULT_GROUP);
                assert_eq!(key, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_purge_missing_group() {
        let mut store = CacheStore::empty(Path::new("cache.json"), GroupPolicy::Shared);
        assert_eq!(store.purge_expired("nope", 0).unwrap(), 0);
    }

    #[test]
    fn test_group_policy() {
        let shared = CacheStore::empty(Path::new("c.json"), GroupPolicy::Shared);
        assert_eq!(shared.group_name("blog/index"), DEFAULT_GROUP);

        let isolated = CacheStore::empty(Path::new("c.json"), GroupPolicy::PerPage);
        assert_eq!(isolated.group_name("blog/index"), "blog/index");
    }

    #[test]
    fn test_remove_owner_respects_policy() {
        let mut shared = CacheStore::empty(Path::new("c.json"), GroupPolicy::Shared);
        shared.replace_group(DEFAULT_GROUP, CacheGroup::new());
        assert!(!shared.remove_owner(DEFAULT_GROUP));
        assert!(shared.has_group(DEFAULT_GROUP));

        let mut isolated = CacheStore::empty(Path::new("c.json"), GroupPolicy::PerPage);
        isolated.replace_group("blog", CacheGroup::new());
        assert!(isolated.remove_owner("blog"));
        assert!(!isolated.remove_owner("blog"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/cache.json");

        let mut store = CacheStore::empty(&path, GroupPolicy::Shared);
        store.replace_group("default", group_of(json!({ "k": { "data": [1, 2] } })));
        store.save().unwrap();

        let loaded = CacheStore::load(&path, GroupPolicy::Shared);
        assert_eq!(loaded.group("default")["k"]["data"], json!([1, 2]));
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let store = CacheStore::load(&path, GroupPolicy::Shared);
        assert!(!store.has_group(DEFAULT_GROUP));
    }
}

//! Record of every artifact written, surfaced to the post-generation hook.
//!
//! Records are partitioned by [`ArtifactKind`] and then by source page, so a
//! deleted page's records can be pruned in one step. Each page may also
//! attach arbitrary `out_data` from its script response.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ArtifactKind {
    /// Rendered page HTML.
    Page,
    /// Composed entry script next to a rendered page.
    Entry,
    /// Verbatim `lib` block written at scan time.
    Lib,
    /// File from a script's `site_files`.
    SiteFile,
}

impl ArtifactKind {
    pub const ALL: [Self; 4] = [Self::Page, Self::Entry, Self::Lib, Self::SiteFile];

    /// Key of this category in the ledger handed to scripts.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Page => "pages",
            Self::Entry => "entries",
            Self::Lib => "libs",
            Self::SiteFile => "files",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    pub path: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub written_at: i64,
}

#[derive(Debug, Default)]
pub struct Ledger {
    artifacts: BTreeMap<ArtifactKind, BTreeMap<String, Vec<LedgerRecord>>>,
    out_data: BTreeMap<String, Value>,
}

impl Ledger {
    pub fn record(&mut self, kind: ArtifactKind, source: &str, path: PathBuf) {
        self.artifacts
            .entry(kind)
            .or_default()
            .entry(source.to_string())
            .or_default()
            .push(LedgerRecord {
                path,
                written_at: chrono::Utc::now().timestamp_millis(),
            });
    }

    pub fn set_out_data(&mut self, source: &str, data: Value) {
        self.out_data.insert(source.to_string(), data);
    }

    pub fn out_data(&self, source: &str) -> Option<&Value> {
        self.out_data.get(source)
    }

    /// Records of `kind` written by `source`.
    pub fn records(&self, kind: ArtifactKind, source: &str) -> &[LedgerRecord] {
        self.artifacts
            .get(&kind)
            .and_then(|by_page| by_page.get(source))
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of records of `kind`.
    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.artifacts
            .get(&kind)
            .map_or(0, |by_page| by_page.values().map(Vec::len).sum())
    }

    pub fn remove_page(&mut self, source: &str) {
        for by_page in self.artifacts.values_mut() {
            by_page.remove(source);
        }
        self.out_data.remove(source);
    }

    #[cfg(test)]
    pub fn mentions(&self, source: &str) -> bool {
        self.out_data.contains_key(source)
            || self.artifacts.values().any(|by_page| by_page.contains_key(source))
    }

    /// JSON view for scripts: one object per category plus `out_data`.
    pub fn to_value(&self) -> Value {
        let mut view = Map::new();
        for kind in ArtifactKind::ALL {
            let records = self
                .artifacts
                .get(&kind)
                .map_or_else(|| json!({}), |by_page| json!(by_page));
            view.insert(kind.key().to_string(), records);
        }
        view.insert("out_data".to_string(), json!(self.out_data));
        Value::Object(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_prune() {
        let mut ledger = Ledger::default();
        ledger.record(ArtifactKind::Page, "blog", "/out/blog/a/index.html".into());
        ledger.record(ArtifactKind::Page, "blog", "/out/blog/b/index.html".into());
        ledger.record(ArtifactKind::Entry, "blog", "/out/blog/a/entry.js".into());
        ledger.record(ArtifactKind::Page, "about", "/out/about/index.html".into());
        ledger.set_out_data("blog", json!({ "count": 2 }));

        assert_eq!(ledger.records(ArtifactKind::Page, "blog").len(), 2);
        assert_eq!(ledger.count(ArtifactKind::Page), 3);

        ledger.remove_page("blog");
        assert!(!ledger.mentions("blog"));
        assert_eq!(ledger.count(ArtifactKind::Page), 1);
        assert!(ledger.records(ArtifactKind::Entry, "blog").is_empty());

        ledger.remove_page("blog");
    }

    #[test]
    fn test_to_value_shape() {
        let mut ledger = Ledger::default();
        ledger.record(ArtifactKind::SiteFile, "feed", "/out/feed.json".into());
        ledger.set_out_data("feed", json!(["x"]));

        let view = ledger.to_value();
        assert_eq!(view["files"]["feed"][0]["path"], json!("/out/feed.json"));
        assert!(view["files"]["feed"][0]["written_at"].is_i64());
        assert_eq!(view["pages"], json!({}));
        assert_eq!(view["out_data"]["feed"], json!(["x"]));
    }
}

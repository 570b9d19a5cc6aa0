//! The value a script passes to `resolve`.

use crate::data::{CacheGroup, GlobalMap};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf};

/// Every key is optional; `resolve()` with no argument is an empty response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Response {
    /// Replaces the cache group wholesale.
    pub cache: Option<CacheGroup>,

    /// Recorded in the ledger against the page.
    #[serde(alias = "outData")]
    pub out_data: Option<Value>,

    /// Output-relative path → contents (strings verbatim, anything else as JSON).
    #[serde(alias = "siteFiles")]
    pub site_files: BTreeMap<String, Value>,

    #[serde(alias = "watchFiles")]
    pub watch_files: Vec<PathBuf>,

    #[serde(alias = "watchGlobs")]
    pub watch_globs: Vec<String>,

    /// Pre-generation hook only: the new global data snapshot.
    pub global: Option<GlobalMap>,
}

impl Response {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }
}

/// Text written for one `site_files` entry.
pub fn site_file_contents(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => serde_json::to_string_pretty(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_response() {
        assert_eq!(Response::from_value(Value::Null).unwrap(), Response::default());
        assert_eq!(Response::from_value(json!({})).unwrap(), Response::default());
    }

    #[test]
    fn test_camel_case_aliases() {
        let response = Response::from_value(json!({
            "outData": { "n": 1 },
            "siteFiles": { "feed.json": [1, 2] },
            "watchFiles": ["/data/a.json"],
            "watch_globs": ["posts/*.md"],
        }))
        .unwrap();

        assert_eq!(response.out_data, Some(json!({ "n": 1 })));
        assert_eq!(response.site_files["feed.json"], json!([1, 2]));
        assert_eq!(response.watch_files, vec![PathBuf::from("/data/a.json")]);
        assert_eq!(response.watch_globs, vec!["posts/*.md"]);
    }

    #[test]
    fn test_invalid_shape() {
        assert!(Response::from_value(json!({ "watch_files": "not a list" })).is_err());
        assert!(Response::from_value(json!("text")).is_err());
    }

    #[test]
    fn test_site_file_contents() {
        assert_eq!(site_file_contents(&json!("plain")).unwrap(), "plain");
        assert_eq!(site_file_contents(&json!({ "a": 1 })).unwrap(), "{\n  \"a\": 1\n}");
    }
}

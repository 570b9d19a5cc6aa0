//! Expansion of a `generate` target into concrete render paths.
//!
//! | Wildcards | Batch            | Result                                   |
//! |-----------|------------------|------------------------------------------|
//! | 0         | never requested  | one render at the literal target         |
//! | 0         | 0 or 1 entries   | one render at the literal target         |
//! | 0         | 2+ entries       | validation failure                       |
//! | 1         | N entries        | N renders, wildcard replaced by `path`   |
//! | 1         | never requested  | nothing                                  |
//! | 2+        | non-empty        | validation failure                       |
//! | 2+        | empty / none     | nothing                                  |

use crate::{
    content::page::{WILDCARD, wildcard_count},
    script::BatchEntry,
    utils::path::trim_slashes,
};
use serde_json::{Map, Value};

/// One page render: output path plus data layered over the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRender {
    pub path: String,
    pub data: Map<String, Value>,
}

pub fn plan(target: &str, batch: Option<Vec<BatchEntry>>) -> Result<Vec<PlannedRender>, String> {
    let literal = |data: Map<String, Value>| PlannedRender {
        path: trim_slashes(target).to_string(),
        data,
    };

    match (wildcard_count(target), batch) {
        (0, None) => Ok(vec![literal(Map::new())]),
        (0, Some(entries)) => match <[BatchEntry; 1]>::try_from(entries) {
            Ok([entry]) => Ok(vec![literal(entry.data)]),
            Err(entries) if entries.is_empty() => Ok(vec![literal(Map::new())]),
            Err(entries) => Err(format!(
                "target `{target}` has no wildcard but {} pages were requested",
                entries.len()
            )),
        },
        (1, entries) => Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| PlannedRender {
                path: trim_slashes(&target.replacen(WILDCARD, trim_slashes(&entry.path), 1))
                    .to_string(),
                data: entry.data,
            })
            .collect()),
        (n, Some(entries)) if !entries.is_empty() => Err(format!(
            "target `{target}` has {n} wildcards; at most one is allowed with generate_pages"
        )),
        _ => Ok(Vec::new()),
    }
}

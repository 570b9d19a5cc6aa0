//! A scanned page: front matter, compiled template and script bodies.

use super::ScanError;
use crate::template::Template;
use serde_json::{Map, Value};
use std::{path::PathBuf, sync::Arc};

pub type FrontMatter = Map<String, Value>;

/// Character substituted by batch entry paths in a `generate` target.
pub const WILDCARD: char = '*';

#[derive(Debug, Clone)]
pub struct Page {
    /// Relative source path without extension, `/`-separated.
    pub name: String,
    pub source: PathBuf,
    pub front_matter: FrontMatter,
    pub template: Arc<dyn Template>,
    pub scripts: PageScripts,
}

/// Script blocks extracted from a page body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScripts {
    pub generate: Option<String>,
    /// Name of the page whose generate script this page runs.
    pub generate_use: Option<String>,
    pub entry: Option<String>,
    pub lib: Option<String>,
}

impl Page {
    /// The `generate` target, if this page produces output.
    pub fn target(&self) -> Option<&str> {
        self.front_matter.get("generate").and_then(Value::as_str)
    }

    /// Name of the page wrapping this one.
    pub fn wrapper(&self) -> Option<&str> {
        self.front_matter
            .get("wrapper")
            .and_then(Value::as_str)
            .map(|w| w.trim_matches('/'))
            .filter(|w| !w.is_empty())
    }
}

/// Number of wildcards in a target path.
pub fn wildcard_count(target: &str) -> usize {
    target.matches(WILDCARD).count()
}

/// Split YAML front matter delimited by `---` lines from the body.
///
/// Returns `None` when the text does not open with a delimiter line or the
/// closing delimiter is missing.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    // Closing delimiter on the last line without a trailing newline.
    None
}

/// Parse the front matter of `content`, returning it with the remaining body.
///
/// Absent front matter is an empty map. Front matter that is not a mapping
/// is an error.
pub fn parse_front_matter<'a>(
    page: &str,
    content: &'a str,
) -> Result<(FrontMatter, &'a str), ScanError> {
    let Some((header, body)) = split_front_matter(content) else {
        return Ok((FrontMatter::new(), content));
    };
    if header.trim().is_empty() {
        return Ok((FrontMatter::new(), body));
    }

    let fail = |message: String| ScanError::FrontMatter {
        page: page.to_string(),
        message,
    };
    let value: Value = serde_yaml::from_str(header).map_err(|e| fail(e.to_string()))?;
    match value {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((FrontMatter::new(), body)),
        other => Err(fail(format!("expected a mapping, found `{other}`"))),
    }
}

//! Script block extraction and page scanning.
//!
//! ```text
//! source text
//!     │
//!     ├── parse_front_matter() ──► FrontMatter
//!     │
//!     └── extract_scripts() ──┬──► PageScripts (generate / generate-use / entry / lib)
//!                             │
//!                             └──► body without script blocks ──► TemplateCompiler
//! ```

use super::{
    ScanError,
    page::{Page, PageScripts, parse_front_matter},
};
use crate::{log, template::TemplateCompiler};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script\s+([^>]*?)\s*>(.*?)</script>").unwrap());

static RE_GENERATE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+(/[A-Za-z0-9_-]+)*$").unwrap());

/// Marker of a recognized script block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Marker {
    Generate,
    GenerateUse(String),
    Entry,
    Lib,
}

/// Classify the attribute text of a `<script ...>` tag.
///
/// Returns `Ok(None)` for ordinary script tags, which stay in the body, and
/// `Err` for a `generate-use` whose reference is malformed.
fn classify(attrs: &str) -> Result<Option<Marker>, String> {
    match attrs {
        "generate" => return Ok(Some(Marker::Generate)),
        "entry" => return Ok(Some(Marker::Entry)),
        "lib" => return Ok(Some(Marker::Lib)),
        _ => {}
    }

    let Some(reference) = attrs.strip_prefix("generate-use:") else {
        return Ok(None);
    };
    let reference = reference
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(reference);

    if RE_GENERATE_REF.is_match(reference) {
        Ok(Some(Marker::GenerateUse(reference.to_string())))
    } else {
        Err(reference.to_string())
    }
}

fn append(slot: &mut Option<String>, code: &str) {
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(code);
        }
        None => *slot = Some(code.to_string()),
    }
}

/// Remove recognized script blocks from `body`.
///
/// Repeated blocks of one kind are joined in source order. A malformed
/// `generate-use` reference is logged and dropped; the block is still
/// removed from the body.
pub fn extract_scripts(page: &str, body: &str) -> (PageScripts, String) {
    let mut scripts = PageScripts::default();
    let mut rest = String::with_capacity(body.len());
    let mut last = 0;

    for caps in RE_SCRIPT.captures_iter(body) {
        let (Some(whole), Some(attrs), Some(code)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };

        let marker = match classify(attrs.as_str()) {
            Ok(Some(marker)) => marker,
            Ok(None) => continue,
            Err(reference) => {
                log!("warn"; "{page}: ignoring malformed generate-use reference `{reference}`");
                rest.push_str(&body[last..whole.start()]);
                last = whole.end();
                continue;
            }
        };

        rest.push_str(&body[last..whole.start()]);
        last = whole.end();

        let code = code.as_str();
        match marker {
            Marker::Generate => append(&mut scripts.generate, code),
            Marker::GenerateUse(reference) => scripts.generate_use = Some(reference),
            Marker::Entry => append(&mut scripts.entry, code),
            Marker::Lib => append(&mut scripts.lib, code),
        }
    }
    rest.push_str(&body[last..]);

    (scripts, rest)
}

/// Build a page from its source text.
pub fn scan_source(
    name: &str,
    source: &Path,
    content: &str,
    compiler: &dyn TemplateCompiler,
) -> Result<Page, ScanError> {
    let (front_matter, body) = parse_front_matter(name, content)?;
    let (scripts, body) = extract_scripts(name, body);
    let template = compiler.compile(name, &body)?;

    Ok(Page {
        name: name.to_string(),
        source: source.to_path_buf(),
        front_matter,
        template,
        scripts,
    })
}

//! Entry script composition.
//!
//! A rendered page gets one entry script: its own `entry` block first, then
//! the `entry` blocks of its wrappers from the outermost inwards.

use crate::content::Page;
use std::sync::Arc;

/// Compose the entry script for a wrapper chain (page first, outermost
/// wrapper last). `None` when no page in the chain has an entry block.
pub fn compose(chain: &[Arc<Page>]) -> Option<String> {
    let (page, wrappers) = chain.split_first()?;

    let parts: Vec<&str> = page
        .scripts
        .entry
        .as_deref()
        .into_iter()
        .chain(wrappers.iter().rev().filter_map(|w| w.scripts.entry.as_deref()))
        .collect();

    (!parts.is_empty()).then(|| parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{content::scan::scan_source, template::BraceCompiler};
    use std::path::Path;

    fn page(name: &str, content: &str) -> Arc<Page> {
        Arc::new(scan_source(name, Path::new(name), content, &BraceCompiler).unwrap())
    }

    #[test]
    fn test_own_entry_then_outermost_wrapper() {
        let chain = [
            page("post", "<script entry>post();</script>"),
            page("article", "<script entry>article();</script>{{@body}}"),
            page("base", "<script entry>base();</script>{{@body}}"),
        ];
        assert_eq!(compose(&chain).unwrap(), "post();\nbase();\narticle();");
    }

    #[test]
    fn test_wrapper_entries_without_own() {
        let chain = [page("post", "x"), page("base", "<script entry>base();</script>")];
        assert_eq!(compose(&chain).unwrap(), "base();");
    }

    #[test]
    fn test_no_entries() {
        assert!(compose(&[page("post", "x")]).is_none());
        assert!(compose(&[]).is_none());
    }
}

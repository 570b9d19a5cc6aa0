//! One-shot site build.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── scan_all() ──► every page source → content store, lib files, queue
//!     │
//!     └── run() ──► pre hook → queued pages → post hook
//! ```

use crate::{
    compiler::{RunReport, run},
    log,
    site::Site,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Instant};

/// Scan every page and run generation once.
///
/// Page scan failures are added to the run's error count. Only fatal errors
/// (an invalid cache expiry) are returned as `Err`.
pub async fn build_site(site: &Arc<Site>) -> Result<RunReport> {
    let started = Instant::now();

    let scan_failures = site.scan_all().await;
    log!("build"; "scanned {} pages", site.pages.read().len());

    let mut report = run(site).await.context("Generation aborted")?;
    report.errors += scan_failures;

    log!("build"; "rendered {} pages from {} requests in {}ms, {} errors",
        report.rendered,
        report.requested,
        started.elapsed().as_millis(),
        report.errors);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn test_build_counts_scan_failures() {
        let fx = Fixture::new();
        fx.write_page("about.html", "---\ngenerate: about\n---\nabout");
        fx.write_page("broken.html", "---\n[not, a, map]\n---\n");

        let report = build_site(&fx.site).await.unwrap();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(fx.read_output("about/index.html").unwrap(), "about");
    }
}

//! Inkwell - an incremental static site engine with scripted page generation.

mod build;
mod cli;
mod compiler;
mod config;
mod content;
mod data;
mod logger;
mod output;
mod script;
mod site;
mod template;
mod utils;
mod watch;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result, bail};
use build::build_site;
use clap::Parser;
use cli::Cli;
use config::SiteConfig;
use site::Site;
use std::sync::Arc;
use watch::watch_for_changes_blocking;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let site = Arc::new(Site::open(config, cli.no_cache()).context("Failed to open output root")?);
    install_shutdown_handler(&site)?;

    let report = runtime.block_on(build_site(&site));
    save_cache(&site);
    let report = report?;

    if cli.is_watch() {
        watch_for_changes_blocking(&site, &runtime)?;
        save_cache(&site);
        return Ok(());
    }

    if report.errors > 0 {
        bail!("build finished with {} errors", report.errors);
    }
    Ok(())
}

/// Persist the cache store on Ctrl+C before exiting.
fn install_shutdown_handler(site: &Arc<Site>) -> Result<()> {
    let site = Arc::clone(site);
    ctrlc::set_handler(move || {
        log!("watch"; "shutting down...");
        save_cache(&site);
        std::process::exit(130);
    })
    .context("Failed to set Ctrl+C handler")
}

fn save_cache(site: &Site) {
    if let Err(err) = site.save_cache() {
        log!("error"; "{}", compiler::error_chain(&err));
    }
}

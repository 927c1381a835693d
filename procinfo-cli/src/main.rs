use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use procinfo_core::{ProcessInfo, SystemInfoCache};

mod config;
mod report;

use config::Args;
use report::HostReport;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting procinfo...");

    // 1. Interrogate the host once; everything below reads the snapshot.
    let cache = Arc::new(SystemInfoCache::for_host());
    cache.ensure_initialized();

    // 2. Process-level facts
    let process = match args.pid {
        Some(pid) => ProcessInfo::new(pid, cache.clone()),
        None => ProcessInfo::current(cache.clone()),
    };

    // 3. Report (with an optional residency probe of a fresh buffer)
    let report = HostReport::build(&cache, &process, args.probe_pages);
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize host report")?;
        println!("{}", json);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}

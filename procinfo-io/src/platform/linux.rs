use std::fs;
use std::path::Path;

use log::{info, warn};
use nix::sys::resource::{getrlimit, Resource};
use nix::sys::utsname::uname;
use serde_json::{Map, Value};

use super::{numa, sysconf_u64, PlatformCollector, RawSystemFacts};
use crate::config::CollectorConfig;

/// Linux host collector.
/// Combines `uname`, `sysconf`, distro release files and `/proc` into one fact set.
pub struct LinuxCollector {
    config: CollectorConfig,
}

impl LinuxCollector {
    pub fn new() -> Self {
        Self::with_config(CollectorConfig::default())
    }

    pub fn with_config(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Distro display name: `PRETTY_NAME` from os-release, then `DISTRIB_DESCRIPTION`
    /// from lsb-release.
    fn distro_name(&self) -> Option<String> {
        read_optional(&self.config.etc_path("os-release"))
            .and_then(|contents| release_value(&contents, "PRETTY_NAME"))
            .or_else(|| {
                read_optional(&self.config.etc_path("lsb-release"))
                    .and_then(|contents| release_value(&contents, "DISTRIB_DESCRIPTION"))
            })
    }

    fn extra_stats(&self, kernel: Option<&str>, page_size: Option<u64>, phys_pages: Option<u64>) -> Map<String, Value> {
        let mut extra = Map::new();

        if let Some(version) = read_optional(&self.config.proc_path("version")) {
            if let Some(line) = version.lines().next() {
                extra.insert("versionString".to_string(), Value::from(line.trim()));
            }
        }
        if let Some(kernel) = kernel {
            extra.insert("kernelVersion".to_string(), Value::from(kernel));
        }

        if let Some(cpuinfo) = read_optional(&self.config.proc_path("cpuinfo")) {
            if let Some(mhz) = cpuinfo_field(&cpuinfo, "cpu MHz") {
                extra.insert("cpuFrequencyMHz".to_string(), Value::from(mhz));
            }
            // x86 reports "flags", ARM reports "Features".
            if let Some(flags) = cpuinfo_field(&cpuinfo, "flags").or_else(|| cpuinfo_field(&cpuinfo, "Features")) {
                extra.insert("cpuFeatures".to_string(), Value::from(flags));
            }
        }

        if let Some(page_size) = page_size {
            extra.insert("pageSize".to_string(), Value::from(page_size));
        }
        if let Some(pages) = phys_pages {
            extra.insert("numPages".to_string(), Value::from(pages));
        }

        match getrlimit(Resource::RLIMIT_NOFILE) {
            Ok((soft, _hard)) => {
                extra.insert("maxOpenFiles".to_string(), Value::from(soft as u64));
            }
            Err(err) => warn!("Failed to read RLIMIT_NOFILE: {}", err),
        }

        extra
    }
}

impl Default for LinuxCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCollector for LinuxCollector {
    fn collect(&self) -> RawSystemFacts {
        let (os_type, os_version, cpu_arch) = match uname() {
            Ok(uts) => (
                non_empty(uts.sysname().to_string_lossy().into_owned()),
                non_empty(uts.release().to_string_lossy().into_owned()),
                non_empty(uts.machine().to_string_lossy().into_owned()),
            ),
            Err(err) => {
                warn!("uname failed: {}. OS identity unknown.", err);
                (None, None, None)
            }
        };

        let page_size = sysconf_u64(libc::_SC_PAGESIZE).filter(|size| size.is_power_of_two());
        let phys_pages = sysconf_u64(libc::_SC_PHYS_PAGES);
        let mem_size = match (phys_pages, page_size) {
            (Some(pages), Some(size)) => pages.checked_mul(size),
            _ => None,
        };
        let num_cores = sysconf_u64(libc::_SC_NPROCESSORS_ONLN).and_then(|count| u32::try_from(count).ok());

        let extra_stats = self.extra_stats(os_version.as_deref(), page_size, phys_pages);

        let facts = RawSystemFacts {
            os_type,
            os_name: self.distro_name(),
            addr_size: cpu_arch.as_deref().map(addr_size_for_arch),
            os_version,
            mem_size,
            num_cores,
            page_size,
            cpu_arch,
            has_numa: Some(numa::check_numa_enabled(&self.config)),
            file_zero_needed: Some(false),
            extra_stats,
        };

        info!(
            "Host discovery: {} cores, {:.2} GB RAM, {} byte pages, arch {}.",
            facts.num_cores.unwrap_or(0),
            facts.mem_size.unwrap_or(0) as f64 / 1e9,
            facts.page_size.unwrap_or(0),
            facts.cpu_arch.as_deref().unwrap_or("unknown"),
        );

        facts
    }
}

/// 64 for any 64-bit machine string (x86_64, aarch64, ppc64le, ...), 32 otherwise.
pub fn addr_size_for_arch(arch: &str) -> u32 {
    if arch.contains("64") {
        64
    } else {
        32
    }
}

/// Extracts `KEY=value` from an os-release style file, stripping quotes.
pub fn release_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        if name.trim() != key {
            return None;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        non_empty(value.to_string())
    })
}

/// First `key : value` pair from `/proc/cpuinfo`.
pub fn cpuinfo_field<'a>(cpuinfo: &'a str, key: &str) -> Option<&'a str> {
    cpuinfo.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == key).then(|| value.trim())
    })
}

fn read_optional(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

use anyhow::{Context, Result};
use log::{info, warn};
use procinfo_core::{ProcessInfo, ResidencyProbe, SystemInfoCache};
use serde::Serialize;
use serde_json::{Map, Value};

/// Everything the binary prints, in one serializable shape.
#[derive(Serialize, Debug)]
pub struct HostReport {
    pub os_type: String,
    pub os_name: String,
    pub os_version: String,
    pub arch: String,
    pub addr_size: u32,
    pub num_cores: u32,
    pub mem_size_mb: u64,
    pub page_size: u64,
    pub numa_enabled: bool,
    pub file_zeroing_needed: bool,
    pub pid: u32,
    pub virtual_mb: Option<u64>,
    pub resident_mb: Option<u64>,
    pub process_extra: Map<String, Value>,
    pub residency: Option<Vec<bool>>,
    pub residency_error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl HostReport {
    pub fn build(cache: &SystemInfoCache, process: &ProcessInfo, probe_pages: usize) -> Self {
        let mut details = Map::new();
        cache.append_extra_stats(&mut details);

        let (virtual_mb, resident_mb, process_extra) = process_memory(process);
        let (residency, residency_error) = match probe_fresh_buffer(cache, probe_pages) {
            Ok(pages) => (pages, None),
            Err(err) => {
                warn!("Residency probe failed: {:#}", err);
                (None, Some(format!("{:#}", err)))
            }
        };

        Self {
            os_type: cache.os_type().to_string(),
            os_name: cache.os_name().to_string(),
            os_version: cache.os_version().to_string(),
            arch: cache.arch().to_string(),
            addr_size: cache.addr_size(),
            num_cores: cache.num_cores(),
            mem_size_mb: cache.mem_size_mb(),
            page_size: cache.page_size(),
            numa_enabled: cache.has_numa_enabled(),
            file_zeroing_needed: cache.is_data_file_zeroing_needed(),
            pid: process.pid(),
            virtual_mb,
            resident_mb,
            process_extra,
            residency,
            residency_error,
            details,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let unknown = |value: &str| if value.is_empty() { "unknown".to_string() } else { value.to_string() };

        out.push_str(&format!("OS:            {} / {} / {}\n", unknown(&self.os_type), unknown(&self.os_name), unknown(&self.os_version)));
        out.push_str(&format!("Arch:          {} ({}-bit)\n", unknown(&self.arch), self.addr_size));
        out.push_str(&format!("Cores:         {}\n", self.num_cores));
        out.push_str(&format!("Memory:        {} MB\n", self.mem_size_mb));
        out.push_str(&format!("Page size:     {} bytes\n", self.page_size));
        out.push_str(&format!("NUMA:          {}\n", self.numa_enabled));
        out.push_str(&format!("File zeroing:  {}\n", self.file_zeroing_needed));
        out.push_str(&format!("Process {}:\n", self.pid));
        out.push_str(&format!("  virtual:     {}\n", mb_or_unknown(self.virtual_mb)));
        out.push_str(&format!("  resident:    {}\n", mb_or_unknown(self.resident_mb)));
        if let Some(faults) = self.process_extra.get("page_faults") {
            out.push_str(&format!("  page faults: {}\n", faults));
        }
        match (&self.residency, &self.residency_error) {
            (Some(pages), _) => {
                let bitmap: String = pages.iter().map(|resident| if *resident { '#' } else { '.' }).collect();
                out.push_str(&format!("Residency:     [{}] (even pages touched)\n", bitmap));
            }
            (None, Some(err)) => out.push_str(&format!("Residency:     unavailable ({})\n", err)),
            (None, None) => {}
        }
        out
    }
}

fn mb_or_unknown(value: Option<u64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |mb| format!("{} MB", mb))
}

fn process_memory(process: &ProcessInfo) -> (Option<u64>, Option<u64>, Map<String, Value>) {
    if !process.supported() {
        info!("Per-process memory reporting is not available on this platform.");
        return (None, None, Map::new());
    }

    let virtual_mb = process
        .virtual_memory_size_mb()
        .map_err(|err| warn!("Virtual size of pid {} unavailable: {}", process.pid(), err))
        .ok();
    let resident_mb = process
        .resident_size_mb()
        .map_err(|err| warn!("Resident size of pid {} unavailable: {}", process.pid(), err))
        .ok();

    let mut extra = Map::new();
    if let Err(err) = process.append_extra_info(&mut extra) {
        warn!("Extra info of pid {} unavailable: {}", process.pid(), err);
    }
    (virtual_mb, resident_mb, extra)
}

/// Maps `num_pages` fresh pages, touches the even ones, and probes all of them in one query.
#[cfg(unix)]
fn probe_fresh_buffer(cache: &SystemInfoCache, num_pages: usize) -> Result<Option<Vec<bool>>> {
    use procinfo_io::AnonymousRegion;

    if num_pages == 0 {
        return Ok(None);
    }

    let probe = ResidencyProbe::for_host(cache);
    if !probe.supported() {
        anyhow::bail!("page residency probing is not supported on this host");
    }

    let page = usize::try_from(probe.page_size()).context("page size does not fit in usize")?;
    let len = page.checked_mul(num_pages).context("probe buffer size overflows")?;
    let mut region = AnonymousRegion::map(len).context("Failed to map probe buffer")?;
    for index in (0..num_pages).step_by(2) {
        region.touch(index * page)?;
    }

    let pages = probe
        .pages_in_memory(region.address(), num_pages)
        .context("Residency query failed")?;
    Ok(Some(pages))
}

#[cfg(not(unix))]
fn probe_fresh_buffer(cache: &SystemInfoCache, num_pages: usize) -> Result<Option<Vec<bool>>> {
    if num_pages == 0 {
        return Ok(None);
    }
    let probe = ResidencyProbe::for_host(cache);
    anyhow::ensure!(probe.supported(), "page residency probing is not supported on this host");
    Ok(None)
}

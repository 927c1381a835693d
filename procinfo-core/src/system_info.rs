use std::sync::OnceLock;

use log::{info, warn};
use procinfo_io::{default_collector, PlatformCollector, RawSystemFacts};
use serde_json::{Map, Value};

pub(crate) const BYTES_PER_MB: u64 = 1024 * 1024;

/// Immutable snapshot of host facts.
///
/// Accessors return the documented default when a fact is unknown
/// (empty text, zero, `false`). Callers that must tell "unknown" from a real
/// zero read [`SystemInfo::raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    raw: RawSystemFacts,
}

impl SystemInfo {
    pub fn from_facts(raw: RawSystemFacts) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &RawSystemFacts {
        &self.raw
    }

    /// e.g. "Linux", "Windows", "Darwin"
    pub fn os_type(&self) -> &str {
        self.raw.os_type.as_deref().unwrap_or("")
    }

    /// e.g. "Ubuntu 22.04.3 LTS"
    pub fn os_name(&self) -> &str {
        self.raw.os_name.as_deref().unwrap_or("")
    }

    /// e.g. "6.1.0-13-amd64"
    pub fn os_version(&self) -> &str {
        self.raw.os_version.as_deref().unwrap_or("")
    }

    pub fn addr_size(&self) -> u32 {
        self.raw.addr_size.unwrap_or(0)
    }

    /// Total physical memory in bytes.
    pub fn mem_size(&self) -> u64 {
        self.raw.mem_size.unwrap_or(0)
    }

    /// Total physical memory in MiB, truncated.
    pub fn mem_size_mb(&self) -> u64 {
        self.mem_size() / BYTES_PER_MB
    }

    pub fn num_cores(&self) -> u32 {
        self.raw.num_cores.unwrap_or(0)
    }

    pub fn page_size(&self) -> u64 {
        self.raw.page_size.unwrap_or(0)
    }

    pub fn arch(&self) -> &str {
        self.raw.cpu_arch.as_deref().unwrap_or("")
    }

    pub fn has_numa_enabled(&self) -> bool {
        self.raw.has_numa.unwrap_or(false)
    }

    /// Whether newly allocated data files must be zero-filled up front.
    pub fn is_data_file_zeroing_needed(&self) -> bool {
        self.raw.file_zero_needed.unwrap_or(false)
    }

    pub fn extra_stats(&self) -> &Map<String, Value> {
        &self.raw.extra_stats
    }

    /// Appends the platform extra stats under `"extra"`.
    pub fn append_system_details(&self, details: &mut Map<String, Value>) {
        details.insert("extra".to_string(), Value::Object(self.raw.extra_stats.clone()));
    }
}

/// Process-lifetime cache of [`SystemInfo`].
///
/// # Logic
/// The snapshot is collected on first access and published through a
/// `OnceLock`. Concurrent first callers block until the single collection
/// pass finishes; nobody observes a partially built snapshot. Reads after
/// that take no lock.
pub struct SystemInfoCache {
    collector: Box<dyn PlatformCollector>,
    snapshot: OnceLock<SystemInfo>,
}

impl SystemInfoCache {
    pub fn new(collector: Box<dyn PlatformCollector>) -> Self {
        Self {
            collector,
            snapshot: OnceLock::new(),
        }
    }

    /// Cache backed by the collector for the current build target.
    pub fn for_host() -> Self {
        Self::new(default_collector())
    }

    /// Collects host facts if that has not happened yet and returns the snapshot.
    /// Idempotent; only the first call does any work.
    pub fn ensure_initialized(&self) -> &SystemInfo {
        self.snapshot.get_or_init(|| {
            let facts = self.collector.collect();
            for field in facts.unknown_fields() {
                warn!("System fact '{}' could not be determined; treating it as unknown.", field);
            }
            let info = SystemInfo::from_facts(facts);
            info!(
                "System info cached: {} {} ({}), {} cores, {} MB RAM, {} byte pages, NUMA={}",
                info.os_type(),
                info.os_version(),
                info.arch(),
                info.num_cores(),
                info.mem_size_mb(),
                info.page_size(),
                info.has_numa_enabled(),
            );
            info
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.get().is_some()
    }

    pub fn snapshot(&self) -> &SystemInfo {
        self.ensure_initialized()
    }

    pub fn os_type(&self) -> &str {
        self.snapshot().os_type()
    }

    pub fn os_name(&self) -> &str {
        self.snapshot().os_name()
    }

    pub fn os_version(&self) -> &str {
        self.snapshot().os_version()
    }

    pub fn addr_size(&self) -> u32 {
        self.snapshot().addr_size()
    }

    pub fn mem_size_mb(&self) -> u64 {
        self.snapshot().mem_size_mb()
    }

    pub fn num_cores(&self) -> u32 {
        self.snapshot().num_cores()
    }

    pub fn page_size(&self) -> u64 {
        self.snapshot().page_size()
    }

    pub fn arch(&self) -> &str {
        self.snapshot().arch()
    }

    pub fn has_numa_enabled(&self) -> bool {
        self.snapshot().has_numa_enabled()
    }

    pub fn is_data_file_zeroing_needed(&self) -> bool {
        self.snapshot().is_data_file_zeroing_needed()
    }

    pub fn append_extra_stats(&self, sink: &mut Map<String, Value>) {
        self.snapshot().append_system_details(sink)
    }
}

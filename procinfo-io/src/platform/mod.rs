use serde::Serialize;
use serde_json::{Map, Value};

#[cfg(target_os = "linux")]
pub mod linux;
pub mod numa;
pub mod portable;

#[cfg(target_os = "linux")]
pub use linux::LinuxCollector;
pub use portable::PortableCollector;

/// Raw host facts as reported by a platform collector.
///
/// Every scalar is optional: `None` means the collector could not determine
/// the value. That is the "unknown" state, which is distinct from a real zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawSystemFacts {
    pub os_type: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub addr_size: Option<u32>,
    /// Total physical memory in bytes.
    pub mem_size: Option<u64>,
    pub num_cores: Option<u32>,
    /// Always a power of two when present.
    pub page_size: Option<u64>,
    pub cpu_arch: Option<String>,
    pub has_numa: Option<bool>,
    pub file_zero_needed: Option<bool>,
    /// Platform-specific diagnostics, opaque to the core.
    pub extra_stats: Map<String, Value>,
}

impl RawSystemFacts {
    /// Names of the facts the collector left unknown.
    pub fn unknown_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("os_type", self.os_type.is_none()),
            ("os_name", self.os_name.is_none()),
            ("os_version", self.os_version.is_none()),
            ("addr_size", self.addr_size.is_none()),
            ("mem_size", self.mem_size.is_none()),
            ("num_cores", self.num_cores.is_none()),
            ("page_size", self.page_size.is_none()),
            ("cpu_arch", self.cpu_arch.is_none()),
            ("has_numa", self.has_numa.is_none()),
            ("file_zero_needed", self.file_zero_needed.is_none()),
        ];
        checks.iter().filter(|(_, missing)| *missing).map(|(name, _)| *name).collect()
    }
}

/// Source of host facts. One implementation is selected per target at build time.
///
/// `collect` is expected to be called once per process; it may block on
/// filesystem reads and must never fail. Facts it cannot determine are left `None`.
pub trait PlatformCollector: Send + Sync {
    fn collect(&self) -> RawSystemFacts;
}

/// Returns the collector for the platform this crate was built for.
pub fn default_collector() -> Box<dyn PlatformCollector> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxCollector::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(PortableCollector)
    }
}

/// Reads a positive `sysconf` value. Zero, negative, or unsupported names yield `None`.
#[cfg(unix)]
pub(crate) fn sysconf_u64(name: libc::c_int) -> Option<u64> {
    // SAFETY: sysconf takes a plain integer and has no memory-safety preconditions.
    let value = unsafe { libc::sysconf(name) };
    if value <= 0 {
        None
    } else {
        Some(value as u64)
    }
}

/// Host page size, if the OS reports a power of two.
#[cfg(unix)]
pub fn system_page_size() -> Option<u64> {
    sysconf_u64(libc::_SC_PAGESIZE).filter(|size| size.is_power_of_two())
}

#[cfg(not(unix))]
pub fn system_page_size() -> Option<u64> {
    None
}

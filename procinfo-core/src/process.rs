use std::sync::Arc;

use procinfo_io::{CollectorConfig, ProcReader, ProcessError};
use serde_json::{Map, Value};

use crate::system_info::{SystemInfoCache, BYTES_PER_MB};

/// Memory facts for one process, plus the shared host snapshot.
pub struct ProcessInfo {
    pid: u32,
    system: Arc<SystemInfoCache>,
    reader: ProcReader,
}

impl ProcessInfo {
    pub fn new(pid: u32, system: Arc<SystemInfoCache>) -> Self {
        Self::with_config(pid, system, CollectorConfig::default())
    }

    /// The calling process.
    pub fn current(system: Arc<SystemInfoCache>) -> Self {
        Self::new(std::process::id(), system)
    }

    pub fn with_config(pid: u32, system: Arc<SystemInfoCache>, config: CollectorConfig) -> Self {
        Self {
            pid,
            system,
            reader: ProcReader::new(config),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn system(&self) -> &SystemInfoCache {
        &self.system
    }

    /// Whether per-process memory figures are available on this platform.
    pub fn supported(&self) -> bool {
        self.reader.supported()
    }

    /// Virtual memory size in MiB.
    pub fn virtual_memory_size_mb(&self) -> Result<u64, ProcessError> {
        let memory = self.reader.memory(self.pid, self.system.page_size())?;
        Ok(memory.virtual_bytes / BYTES_PER_MB)
    }

    /// Resident set size in MiB.
    pub fn resident_size_mb(&self) -> Result<u64, ProcessError> {
        let memory = self.reader.memory(self.pid, self.system.page_size())?;
        Ok(memory.resident_bytes / BYTES_PER_MB)
    }

    /// Appends per-process extras (`page_faults`).
    pub fn append_extra_info(&self, info: &mut Map<String, Value>) -> Result<(), ProcessError> {
        let faults = self.reader.major_faults(self.pid)?;
        info.insert("page_faults".to_string(), Value::from(faults));
        Ok(())
    }
}

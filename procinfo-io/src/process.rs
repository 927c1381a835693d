use std::fs;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::config::CollectorConfig;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Per-process memory reporting is not supported on this platform")]
    Unsupported,
    #[error("System page size is unknown")]
    UnknownPageSize,
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed {0}")]
    Malformed(String),
}

/// Memory footprint of one process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessMemory {
    pub virtual_bytes: u64,
    pub resident_bytes: u64,
}

/// Reads per-process counters from `<proc>/<pid>/`.
#[derive(Debug, Clone, Default)]
pub struct ProcReader {
    config: CollectorConfig,
}

impl ProcReader {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Whether the host exposes per-process memory counters.
    pub fn supported(&self) -> bool {
        cfg!(target_os = "linux")
    }

    /// Virtual and resident size from `statm`, whose columns are page counts.
    pub fn memory(&self, pid: u32, page_size: u64) -> Result<ProcessMemory, ProcessError> {
        if !self.supported() {
            return Err(ProcessError::Unsupported);
        }
        if page_size == 0 {
            return Err(ProcessError::UnknownPageSize);
        }
        let statm = self.read(pid, "statm")?;
        let (size, resident) = parse_statm(&statm)?;
        Ok(ProcessMemory {
            virtual_bytes: size.saturating_mul(page_size),
            resident_bytes: resident.saturating_mul(page_size),
        })
    }

    /// Major page faults taken by the process (field 12 of `stat`).
    pub fn major_faults(&self, pid: u32) -> Result<u64, ProcessError> {
        if !self.supported() {
            return Err(ProcessError::Unsupported);
        }
        let stat = self.read(pid, "stat")?;
        parse_major_faults(&stat)
    }

    fn read(&self, pid: u32, file: &str) -> Result<String, ProcessError> {
        let path = self.config.proc_path(format!("{}/{}", pid, file));
        debug!("Reading {}", path.display());
        fs::read_to_string(&path).map_err(|source| ProcessError::Io { path, source })
    }
}

fn parse_statm(statm: &str) -> Result<(u64, u64), ProcessError> {
    let mut fields = statm.split_whitespace().map(|field| field.parse::<u64>());
    match (fields.next(), fields.next()) {
        (Some(Ok(size)), Some(Ok(resident))) => Ok((size, resident)),
        _ => Err(ProcessError::Malformed(format!("statm: {:?}", statm.trim()))),
    }
}

fn parse_major_faults(stat: &str) -> Result<u64, ProcessError> {
    // comm (field 2) may contain spaces and parentheses; fields resume after the last ')'.
    let rest = stat
        .rfind(')')
        .map(|idx| &stat[idx + 1..])
        .ok_or_else(|| ProcessError::Malformed("stat: missing comm".to_string()))?;

    // rest starts at field 3 (state); majflt is field 12.
    rest.split_whitespace()
        .nth(9)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| ProcessError::Malformed("stat: missing majflt".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "4242 (my (odd) app) S 1 4242 4242 0 -1 4194560 1500 0 37 0 10 5 0 0 20 0 1 0 100 123456 300\n";

    fn fixture(pid: u32, statm: &str, stat: &str) -> (TempDir, ProcReader) {
        let dir = TempDir::new().unwrap();
        let config = CollectorConfig::rooted_at(dir.path());
        let proc_dir = config.proc_path(pid.to_string());
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(proc_dir.join("statm"), statm).unwrap();
        fs::write(proc_dir.join("stat"), stat).unwrap();
        (dir, ProcReader::new(config))
    }

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm("2048 512 100 10 0 300 0\n").unwrap(), (2048, 512));
        assert!(parse_statm("garbage").is_err());
        assert!(parse_statm("").is_err());
    }

    #[test]
    fn test_parse_major_faults_handles_parens_in_comm() {
        assert_eq!(parse_major_faults(STAT).unwrap(), 37);
        assert!(parse_major_faults("4242 no-comm").is_err());
        assert!(parse_major_faults("4242 (short) S 1").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_from_fixture() {
        let (_dir, reader) = fixture(4242, "2048 512 100 10 0 300 0\n", STAT);
        let memory = reader.memory(4242, 4096).unwrap();
        assert_eq!(memory.virtual_bytes, 2048 * 4096);
        assert_eq!(memory.resident_bytes, 512 * 4096);
        assert_eq!(reader.major_faults(4242).unwrap(), 37);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_process_is_io_error() {
        let (_dir, reader) = fixture(1, "1 1\n", STAT);
        assert!(matches!(reader.memory(99999, 4096), Err(ProcessError::Io { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unknown_page_size() {
        let (_dir, reader) = fixture(1, "1 1\n", STAT);
        assert!(matches!(reader.memory(1, 0), Err(ProcessError::UnknownPageSize)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_live_process_has_resident_memory() {
        let reader = ProcReader::default();
        let memory = reader.memory(std::process::id(), 4096).unwrap();
        assert!(memory.resident_bytes > 0);
        assert!(memory.virtual_bytes >= memory.resident_bytes);
    }
}

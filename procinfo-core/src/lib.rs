//! Procinfo core: the host-facts snapshot and the page residency probe.
//!
//! The host application builds one [`SystemInfoCache`] at startup and shares it
//! (`Arc`) with whatever needs environment facts. Collection happens once, on
//! first read; everything after that is a plain read of the snapshot.

pub mod system_info;
pub mod probe;
pub mod process;

pub use probe::{align_to_page_start, ResidencyProbe};
pub use process::ProcessInfo;
pub use system_info::{SystemInfo, SystemInfoCache};

pub use procinfo_io::{PlatformCollector, ProbeError, ProcessError, RawSystemFacts, ResidencyQuery};

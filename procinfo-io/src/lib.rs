//! Procinfo I/O: the platform layer.
//!
//! This crate talks to the host directly (`libc`, `nix`, `/proc`, `/sys`, `/etc`)
//! and hands raw facts upward. It never caches anything; `procinfo-core`
//! owns the snapshot and the probe contracts built on top of these collaborators.

pub mod config;
pub mod platform;
pub mod residency;
pub mod process;
#[cfg(unix)]
pub mod memory;

// Re-exports for easier access by procinfo-core
pub use config::CollectorConfig;
pub use platform::{default_collector, PlatformCollector, RawSystemFacts};
pub use residency::{default_query, ProbeError, ResidencyQuery, UnsupportedQuery};
pub use process::{ProcReader, ProcessError, ProcessMemory};
#[cfg(unix)]
pub use memory::{AnonymousRegion, MemoryError};
pub use nix::errno::Errno;

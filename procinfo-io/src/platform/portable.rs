use std::env::consts;
use std::thread::available_parallelism;

use log::warn;

use super::{system_page_size, PlatformCollector, RawSystemFacts};

/// Fallback collector for targets without a native one.
///
/// Reports what the standard library knows about the build target and the
/// page size where `sysconf` exists. Memory size, distro name and NUMA policy
/// stay unknown.
pub struct PortableCollector;

impl PlatformCollector for PortableCollector {
    fn collect(&self) -> RawSystemFacts {
        let num_cores = match available_parallelism() {
            Ok(count) => u32::try_from(count.get()).ok(),
            Err(err) => {
                warn!("Failed to detect core count: {}.", err);
                None
            }
        };

        RawSystemFacts {
            os_type: Some(consts::OS.to_string()),
            cpu_arch: Some(consts::ARCH.to_string()),
            addr_size: Some(usize::BITS),
            num_cores,
            page_size: system_page_size(),
            ..Default::default()
        }
    }
}

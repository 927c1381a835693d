use std::fs::File;
use std::io::{BufRead, BufReader};

use log::{debug, warn};

use crate::config::CollectorConfig;

/// Determines whether this process runs on a multi-node NUMA host without an
/// interleaved memory policy.
///
/// # Logic
/// NUMA is reported only when both hold:
/// - `<sys>/devices/system/node/node1` exists (more than one memory node), and
/// - the first mapping in `<proc>/self/numa_maps` does not carry an `interleave` policy.
///
/// Any missing or unreadable file yields `false`; an unknown policy is never an error.
pub fn check_numa_enabled(config: &CollectorConfig) -> bool {
    let second_node = config.sys_path("devices/system/node/node1");
    let numa_maps = config.proc_path("self/numa_maps");

    if !second_node.exists() || !numa_maps.exists() {
        debug!("Single memory node or no numa_maps; NUMA reported as disabled.");
        return false;
    }

    let file = match File::open(&numa_maps) {
        Ok(file) => file,
        Err(err) => {
            warn!("Failed to open {}: {}. NUMA reported as disabled.", numa_maps.display(), err);
            return false;
        }
    };

    let mut first_line = String::new();
    if let Err(err) = BufReader::new(file).read_line(&mut first_line) {
        warn!("Failed to read {}: {}. NUMA reported as disabled.", numa_maps.display(), err);
        return false;
    }

    !policy_is_interleaved(&first_line)
}

fn policy_is_interleaved(numa_maps_line: &str) -> bool {
    numa_maps_line.contains("interleave")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(nodes: usize, numa_maps: Option<&str>) -> (TempDir, CollectorConfig) {
        let dir = TempDir::new().unwrap();
        let config = CollectorConfig::rooted_at(dir.path());
        for node in 0..nodes {
            fs::create_dir_all(config.sys_path(format!("devices/system/node/node{}", node))).unwrap();
        }
        fs::create_dir_all(config.proc_path("self")).unwrap();
        if let Some(contents) = numa_maps {
            fs::write(config.proc_path("self/numa_maps"), contents).unwrap();
        }
        (dir, config)
    }

    #[test]
    fn test_two_nodes_default_policy_is_numa() {
        let (_dir, config) = fixture(2, Some("00400000 default file=/usr/bin/app mapped=10 N0=10\n"));
        assert!(check_numa_enabled(&config));
    }

    #[test]
    fn test_interleaved_policy_is_not_numa() {
        let (_dir, config) = fixture(2, Some("00400000 interleave:0-1 file=/usr/bin/app mapped=10\n"));
        assert!(!check_numa_enabled(&config));
    }

    #[test]
    fn test_single_node_is_not_numa() {
        let (_dir, config) = fixture(1, Some("00400000 default\n"));
        assert!(!check_numa_enabled(&config));
    }

    #[test]
    fn test_missing_numa_maps_defaults_to_false() {
        let (_dir, config) = fixture(2, None);
        assert!(!check_numa_enabled(&config));
    }

    #[test]
    fn test_only_first_line_is_consulted() {
        let (_dir, config) = fixture(2, Some("00400000 default\n7f0000000000 interleave:0-1\n"));
        assert!(check_numa_enabled(&config));
    }
}

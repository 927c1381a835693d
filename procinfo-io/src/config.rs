use std::path::{Path, PathBuf};

/// Filesystem roots the Linux collector and process reader read from.
///
/// Defaults to the live host (`/proc`, `/sys`, `/etc`). Pointing the roots at a
/// fixture tree lets the parsing paths run without touching the real system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub etc_root: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            etc_root: PathBuf::from("/etc"),
        }
    }
}

impl CollectorConfig {
    /// Roots every tree under `base` (`<base>/proc`, `<base>/sys`, `<base>/etc`).
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            proc_root: base.join("proc"),
            sys_root: base.join("sys"),
            etc_root: base.join("etc"),
        }
    }

    pub fn proc_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.proc_root.join(relative)
    }

    pub fn sys_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.sys_root.join(relative)
    }

    pub fn etc_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.etc_root.join(relative)
    }
}

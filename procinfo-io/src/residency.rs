use std::sync::Arc;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Page residency probing is not supported on this platform")]
    Unsupported,
    #[error("A residency query needs at least one page")]
    NoPages,
    #[error("Page size {0} is not a power of two")]
    InvalidPageSize(u64),
    #[error("{num_pages} pages starting at {start:#x} overflow the address space")]
    RangeOverflow { start: usize, num_pages: usize },
    #[error("Residency query returned {actual} entries for {expected} pages")]
    ShortResult { expected: usize, actual: usize },
    #[error("Residency query failed: {0}")]
    QueryFailed(Errno),
}

/// The host's batch residency query.
///
/// Implementations answer for `num_pages` consecutive pages starting at a
/// page-aligned address, one boolean per page in ascending address order.
/// Alignment and argument validation happen in the caller.
pub trait ResidencyQuery: Send + Sync {
    /// Whether this process can ask the OS about page residency at all.
    fn supported(&self) -> bool;

    fn query_residency(&self, aligned_start: usize, num_pages: usize, page_size: u64) -> Result<Vec<bool>, ProbeError>;
}

/// Query for targets without a residency syscall. Always refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedQuery;

impl ResidencyQuery for UnsupportedQuery {
    fn supported(&self) -> bool {
        false
    }

    fn query_residency(&self, _aligned_start: usize, _num_pages: usize, _page_size: u64) -> Result<Vec<bool>, ProbeError> {
        Err(ProbeError::Unsupported)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use self::mincore::MincoreQuery;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod mincore {
    use libc::c_void;
    use log::debug;
    use nix::errno::Errno;

    use super::{ProbeError, ResidencyQuery};

    /// `mincore(2)` backed residency query.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MincoreQuery;

    impl ResidencyQuery for MincoreQuery {
        fn supported(&self) -> bool {
            true
        }

        /// # Logic
        /// One `mincore` call covers the whole run. The kernel fills one byte per
        /// page; bit 0 set means the page is resident.
        ///
        /// # Errors
        /// `ENOMEM` for ranges that are not fully mapped, `EINVAL` for an
        /// unaligned start, both surfaced as `ProbeError::QueryFailed`.
        fn query_residency(&self, aligned_start: usize, num_pages: usize, page_size: u64) -> Result<Vec<bool>, ProbeError> {
            let len = (num_pages as u64)
                .checked_mul(page_size)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .ok_or(ProbeError::RangeOverflow { start: aligned_start, num_pages })?;

            let mut vec = vec![0u8; num_pages];

            // SAFETY: mincore only inspects page tables for [start, start + len)
            // and validates the range itself. `vec` holds one byte per page.
            let ret = unsafe { libc::mincore(aligned_start as *mut c_void, len, vec.as_mut_ptr()) };
            if ret != 0 {
                let errno = Errno::last();
                debug!("mincore({:#x}, {} pages) failed: {}", aligned_start, num_pages, errno);
                return Err(ProbeError::QueryFailed(errno));
            }

            Ok(vec.into_iter().map(|byte| byte & 1 != 0).collect())
        }
    }
}

/// Returns the residency query for the platform this crate was built for.
pub fn default_query() -> Arc<dyn ResidencyQuery> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Arc::new(MincoreQuery)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        Arc::new(UnsupportedQuery)
    }
}

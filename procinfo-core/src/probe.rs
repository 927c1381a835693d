use std::sync::Arc;

use log::debug;
use procinfo_io::{default_query, ProbeError, ResidencyQuery};

use crate::system_info::SystemInfoCache;

/// Start of the page containing `address`.
///
/// `page_size` must be a power of two.
#[inline]
pub fn align_to_page_start(address: usize, page_size: u64) -> usize {
    debug_assert!(page_size.is_power_of_two(), "page size {} is not a power of two", page_size);
    address & !((page_size as usize).wrapping_sub(1))
}

/// Page residency probe.
///
/// Stateless apart from the page size and the platform query it wraps.
/// Safe to share and call from any number of threads; each query is one
/// blocking call into the OS with no retries.
#[derive(Clone)]
pub struct ResidencyProbe {
    page_size: u64,
    query: Arc<dyn ResidencyQuery>,
}

impl ResidencyProbe {
    pub fn new(page_size: u64, query: Arc<dyn ResidencyQuery>) -> Self {
        Self { page_size, query }
    }

    /// Probe using the cached host page size and the platform's residency query.
    pub fn for_host(cache: &SystemInfoCache) -> Self {
        Self::new(cache.page_size(), default_query())
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Whether residency can be queried here: the platform answers such
    /// queries and the page size is known.
    pub fn supported(&self) -> bool {
        self.page_size.is_power_of_two() && self.query.supported()
    }

    /// Only meaningful when [`supported`](Self::supported) is true.
    pub fn align_to_page_start(&self, address: usize) -> usize {
        align_to_page_start(address, self.page_size)
    }

    /// Residency of `num_pages` consecutive pages, starting with the page that
    /// contains `start`.
    ///
    /// Index `i` of the result describes the page at
    /// `align_to_page_start(start) + i * page_size`.
    ///
    /// # Errors
    /// - `Unsupported` if the platform cannot answer residency queries.
    /// - `InvalidPageSize` if the page size is unknown or not a power of two.
    /// - `NoPages` if `num_pages` is zero.
    /// - `RangeOverflow` if the run extends past the end of the address space.
    /// - `QueryFailed` if the OS rejected the query (e.g. unmapped range).
    pub fn pages_in_memory(&self, start: usize, num_pages: usize) -> Result<Vec<bool>, ProbeError> {
        if !self.query.supported() {
            return Err(ProbeError::Unsupported);
        }
        if !self.page_size.is_power_of_two() {
            return Err(ProbeError::InvalidPageSize(self.page_size));
        }
        if num_pages == 0 {
            return Err(ProbeError::NoPages);
        }

        let aligned = self.align_to_page_start(start);
        let span = (num_pages as u64)
            .checked_mul(self.page_size)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .and_then(|bytes| aligned.checked_add(bytes));
        if span.is_none() {
            return Err(ProbeError::RangeOverflow { start: aligned, num_pages });
        }

        let pages = self.query.query_residency(aligned, num_pages, self.page_size)?;
        if pages.len() != num_pages {
            return Err(ProbeError::ShortResult { expected: num_pages, actual: pages.len() });
        }

        debug!(
            "Residency of {} pages at {:#x}: {} resident",
            num_pages,
            aligned,
            pages.iter().filter(|resident| **resident).count()
        );
        Ok(pages)
    }

    /// Residency of the single page containing `address`.
    pub fn block_in_memory(&self, address: usize) -> Result<bool, ProbeError> {
        let pages = self.pages_in_memory(address, 1)?;
        Ok(pages[0])
    }

    /// Residency of every page overlapping `bytes`, in one query.
    pub fn range_in_memory(&self, bytes: &[u8]) -> Result<Vec<bool>, ProbeError> {
        if bytes.is_empty() {
            return Err(ProbeError::NoPages);
        }
        if !self.page_size.is_power_of_two() {
            return Err(ProbeError::InvalidPageSize(self.page_size));
        }
        let start = bytes.as_ptr() as usize;
        let last = start + (bytes.len() - 1);
        let first_page = self.align_to_page_start(start);
        let last_page = self.align_to_page_start(last);
        let num_pages = (last_page - first_page) / self.page_size as usize + 1;
        self.pages_in_memory(start, num_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    const PAGE: u64 = 4096;

    /// Pretends a fixed set of page addresses is resident and records every call.
    #[derive(Default)]
    struct FakeQuery {
        resident: BTreeSet<usize>,
        calls: Mutex<Vec<(usize, usize)>>,
        fail_with: Option<ProbeError>,
    }

    impl FakeQuery {
        fn with_resident(pages: &[usize]) -> Self {
            Self {
                resident: pages.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl ResidencyQuery for FakeQuery {
        fn supported(&self) -> bool {
            true
        }

        fn query_residency(&self, aligned_start: usize, num_pages: usize, page_size: u64) -> Result<Vec<bool>, ProbeError> {
            self.calls.lock().unwrap().push((aligned_start, num_pages));
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok((0..num_pages)
                .map(|i| self.resident.contains(&(aligned_start + i * page_size as usize)))
                .collect())
        }
    }

    fn fake_probe(query: FakeQuery) -> (ResidencyProbe, Arc<FakeQuery>) {
        let query = Arc::new(query);
        (ResidencyProbe::new(PAGE, query.clone()), query)
    }

    #[test]
    fn test_align_scenario() {
        assert_eq!(align_to_page_start(4100, 4096), 4096);
        assert_eq!(align_to_page_start(4096, 4096), 4096);
        assert_eq!(align_to_page_start(4095, 4096), 0);
        assert_eq!(align_to_page_start(0x7fff_1234, 65536), 0x7fff_0000);
    }

    #[test]
    fn test_align_law_and_idempotence() {
        for shift in [12u32, 14, 16, 21] {
            let page = 1u64 << shift;
            for address in [0usize, 1, 4095, 4096, 4100, 123_456_789, usize::MAX] {
                let aligned = align_to_page_start(address, page);
                assert_eq!(aligned, address - (address % page as usize));
                assert_eq!(align_to_page_start(aligned, page), aligned);
            }
        }
    }

    #[test]
    fn test_mixed_residency_scenario() {
        let base = 0x10_0000;
        let (probe, query) = fake_probe(FakeQuery::with_resident(&[base, base + 2 * PAGE as usize]));
        assert_eq!(probe.pages_in_memory(base, 3).unwrap(), vec![true, false, true]);
        assert_eq!(*query.calls.lock().unwrap(), vec![(base, 3)]);
    }

    #[test]
    fn test_unaligned_start_queries_containing_page() {
        let base = 0x10_0000;
        let (probe, query) = fake_probe(FakeQuery::with_resident(&[base + PAGE as usize]));
        let pages = probe.pages_in_memory(base + 17, 2).unwrap();
        assert_eq!(pages, vec![false, true]);
        assert_eq!(query.calls.lock().unwrap()[0], (base, 2));
    }

    #[test]
    fn test_batch_and_single_agree() {
        let base = 0x20_0000;
        let (probe, _) = fake_probe(FakeQuery::with_resident(&[base, base + 3 * PAGE as usize]));
        let batch = probe.pages_in_memory(base, 4).unwrap();
        for (i, resident) in batch.iter().enumerate() {
            let address = base + i * PAGE as usize + 5;
            assert_eq!(probe.block_in_memory(address).unwrap(), *resident);
            assert_eq!(probe.pages_in_memory(address, 1).unwrap()[0], *resident);
        }
    }

    #[test]
    fn test_unsupported_platform_never_reports_resident() {
        let probe = ResidencyProbe::new(PAGE, Arc::new(procinfo_io::UnsupportedQuery));
        assert!(!probe.supported());
        assert_eq!(probe.block_in_memory(0x1000), Err(ProbeError::Unsupported));
        assert_eq!(probe.pages_in_memory(0x1000, 4), Err(ProbeError::Unsupported));
    }

    #[test]
    fn test_zero_pages_rejected_before_query() {
        let (probe, query) = fake_probe(FakeQuery::default());
        assert_eq!(probe.pages_in_memory(0x1000, 0), Err(ProbeError::NoPages));
        assert!(query.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_page_size_is_unsupported() {
        let probe = ResidencyProbe::new(0, Arc::new(FakeQuery::default()));
        assert!(!probe.supported());
        assert_eq!(probe.block_in_memory(0x1000), Err(ProbeError::InvalidPageSize(0)));
    }

    #[test]
    fn test_range_overflow_rejected() {
        let (probe, query) = fake_probe(FakeQuery::default());
        let near_end = align_to_page_start(usize::MAX, PAGE);
        assert!(matches!(probe.pages_in_memory(near_end, 2), Err(ProbeError::RangeOverflow { .. })));
        assert!(query.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_query_failure_is_distinct_from_not_resident() {
        let failing = FakeQuery {
            fail_with: Some(ProbeError::QueryFailed(procinfo_io::Errno::ENOMEM)),
            ..Default::default()
        };
        let (probe, _) = fake_probe(failing);
        assert_eq!(
            probe.block_in_memory(0x1000),
            Err(ProbeError::QueryFailed(procinfo_io::Errno::ENOMEM))
        );
    }

    #[test]
    fn test_short_result_is_an_error() {
        struct Truncating;
        impl ResidencyQuery for Truncating {
            fn supported(&self) -> bool {
                true
            }
            fn query_residency(&self, _: usize, _: usize, _: u64) -> Result<Vec<bool>, ProbeError> {
                Ok(vec![true])
            }
        }
        let probe = ResidencyProbe::new(PAGE, Arc::new(Truncating));
        assert_eq!(
            probe.pages_in_memory(0x1000, 3),
            Err(ProbeError::ShortResult { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn test_range_in_memory_covers_straddling_slice() {
        let (probe, query) = fake_probe(FakeQuery::default());
        let buffer = vec![0u8; 3 * PAGE as usize];
        let slice = &buffer[10..10 + PAGE as usize];
        let start = slice.as_ptr() as usize;
        let expected_pages = if align_to_page_start(start, PAGE) == align_to_page_start(start + PAGE as usize - 1, PAGE) {
            1
        } else {
            2
        };
        assert_eq!(probe.range_in_memory(slice).unwrap().len(), expected_pages);
        assert_eq!(query.calls.lock().unwrap()[0].1, expected_pages);
        assert_eq!(probe.range_in_memory(&[]), Err(ProbeError::NoPages));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_probe_sees_touched_pages() {
        use procinfo_io::AnonymousRegion;

        let cache = SystemInfoCache::for_host();
        let probe = ResidencyProbe::for_host(&cache);
        assert!(probe.supported());

        let page = probe.page_size() as usize;
        let mut region = AnonymousRegion::map(3 * page).unwrap();
        region.touch(0).unwrap();
        region.touch(2 * page + 7).unwrap();

        assert_eq!(probe.pages_in_memory(region.address() + 100, 3).unwrap(), vec![true, false, true]);
        assert!(probe.block_in_memory(region.address() + 2 * page).unwrap());
    }
}

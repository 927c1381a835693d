use std::ptr;

use libc::{c_void, mmap, munmap, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use log::debug;
use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Cannot map an empty region")]
    EmptyRegion,
    #[error("Failed to map anonymous memory: {0}")]
    MapFailed(Errno),
    #[error("Offset {offset} is outside a region of {len} bytes")]
    OutOfBounds { offset: usize, len: usize },
}

/// A private anonymous mapping.
///
/// Pages of a fresh mapping are not backed by physical memory until first
/// written, which makes this the natural fixture for residency queries:
/// touch some pages, leave the others cold.
pub struct AnonymousRegion {
    ptr: *mut u8,
    len: usize,
}

// The region is plain memory owned by this handle.
unsafe impl Send for AnonymousRegion {}
unsafe impl Sync for AnonymousRegion {}

impl AnonymousRegion {
    /// Maps `len` bytes of zero-filled, untouched memory.
    ///
    /// # Errors
    /// Returns `MemoryError::MapFailed` with the OS errno if `mmap` refuses.
    pub fn map(len: usize) -> Result<Self, MemoryError> {
        if len == 0 {
            return Err(MemoryError::EmptyRegion);
        }

        // SAFETY: Anonymous private mapping with no fixed address; the kernel
        // picks the placement and validates `len`.
        let ptr = unsafe { mmap(ptr::null_mut(), len, PROT_READ | PROT_WRITE, MAP_PRIVATE | MAP_ANON, -1, 0) };
        if ptr == MAP_FAILED {
            return Err(MemoryError::MapFailed(Errno::last()));
        }

        debug!("Mapped anonymous region of {} bytes at {:p}", len, ptr);
        Ok(Self { ptr: ptr as *mut u8, len })
    }

    /// Writes one byte at `offset`, faulting its page into physical memory.
    pub fn touch(&mut self, offset: usize) -> Result<(), MemoryError> {
        if offset >= self.len {
            return Err(MemoryError::OutOfBounds { offset, len: self.len });
        }
        // SAFETY: offset is within the mapping, which is readable and writable.
        unsafe { ptr::write_volatile(self.ptr.add(offset), 1) };
        Ok(())
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Start address of the mapping. Always page aligned.
    pub fn address(&self) -> usize {
        self.ptr as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for AnonymousRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and len describe exactly the mapping created in map().
        unsafe {
            munmap(self.ptr as *mut c_void, self.len);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The mapped region: a fixed 4096-byte file backing a [`header::RegionHeader`]
//! followed by a ring of [`entry::TimedataEntry`] slots.
//!
//! This region is addressed by a regular file path rather than a POSIX shm
//! name, since it needs a sidecar `<path>.lock` file next to it (see
//! `DESIGN.md`), which only makes sense for a path-addressable backing
//! store. The fd is kept open for the life of the mapping so a writable
//! mapping can flush its data to stable storage on drop.

pub mod entry;
pub mod header;
pub mod mutex;

use crate::error::{Error, Result};
use entry::{TimedataEntry, ENTRY_SIZE, NUM_ENTRIES};
use header::{RegionHeader, HEADER_SIZE};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

/// Total size of the region file, fixed by the on-disk layout documented
/// in `DESIGN.md`: one 4 KiB page.
pub const REGION_SIZE: usize = HEADER_SIZE + NUM_ENTRIES * ENTRY_SIZE;

const _: () = assert!(REGION_SIZE == 4096);

/// A `mmap`ed view of a region file, read-write or read-only.
pub struct MappedRegion {
    ptr: *mut u8,
    file: File,
    writable: bool,
}

// SAFETY: the mapping is backed by `MAP_SHARED` memory whose only mutable
// fields (`index`, the mutex word, the unpublished slot, `real_offset`,
// `era`/`magic` at init) are synchronized via the atomics and fences in
// `header` and `mutex`; concurrent access from other threads in this
// process is exactly as sound as concurrent access from other processes.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Open or create the region file at `path`, sized to exactly
    /// [`REGION_SIZE`], and map it read-write/shared. Does not touch the
    /// contents; callers decide whether the freshly mapped region needs
    /// first-time initialization.
    pub fn create_rw(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;
        Self::map(file, true)
    }

    /// Open an existing region file read-only and map it read-only/shared.
    /// Requires the file to already be at least [`REGION_SIZE`] bytes;
    /// this is a benign-mistake check only — a hostile truncation *after*
    /// this check is the fault-recovery scope's job, not this function's.
    pub fn open_ro(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let len = file.metadata()?.len();
        if len < REGION_SIZE as u64 {
            return Err(Error::Protocol(format!(
                "region file is {len} bytes, expected at least {REGION_SIZE}"
            )));
        }
        Self::map(file, false)
    }

    fn map(file: File, writable: bool) -> Result<Self> {
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        // SAFETY: `file` is open with permissions matching `prot`, sized to
        // at least `REGION_SIZE`, and the mapping offset/length stay within
        // that size.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                REGION_SIZE,
                prot,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(Self {
            ptr: ptr as *mut u8,
            file,
            writable,
        })
    }

    #[must_use]
    pub fn header(&self) -> &RegionHeader {
        // SAFETY: the mapping is at least `REGION_SIZE` bytes and
        // `RegionHeader` occupies the first `HEADER_SIZE` of them.
        unsafe { &*(self.ptr as *const RegionHeader) }
    }

    /// # Panics
    /// Panics if this region was mapped read-only; callers must check
    /// `writable()` (provider-only code path) before calling.
    #[must_use]
    pub fn header_mut(&self) -> &mut RegionHeader {
        assert!(self.writable, "header_mut() on a read-only mapping");
        // SAFETY: same layout guarantee as `header()`; exclusivity is the
        // caller's responsibility via the sidecar file lock.
        unsafe { &mut *(self.ptr as *mut RegionHeader) }
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Copy the entry at ring slot `index` out of the mapping.
    ///
    /// # Safety
    /// `index` must be `< NUM_ENTRIES`; callers must bounds-check before
    /// calling, ideally inside a fault-recovery scope on the consumer
    /// side since the backing file may have been truncated.
    pub unsafe fn read_entry(&self, index: u32) -> TimedataEntry {
        let slot_ptr = self
            .ptr
            .add(HEADER_SIZE + index as usize * ENTRY_SIZE)
            .cast::<TimedataEntry>();
        ptr::read_volatile(slot_ptr)
    }

    /// Write `entry` into ring slot `index`.
    ///
    /// # Safety
    /// `index` must be `< NUM_ENTRIES` and the caller must hold the writer
    /// mutex and own exclusive write access (provider side only).
    pub unsafe fn write_entry(&self, index: u32, entry: &TimedataEntry) {
        let slot_ptr = self
            .ptr
            .add(HEADER_SIZE + index as usize * ENTRY_SIZE)
            .cast::<TimedataEntry>();
        ptr::write_volatile(slot_ptr, *entry);
    }

    /// Flush the backing file to stable storage. No-op for a read-only
    /// mapping.
    pub fn fsync(&self) -> Result<()> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // Flush a writable mapping's data to stable storage before
        // unmapping and closing the fd, so a provider that drops its
        // region on shutdown doesn't lose the last published entry to an
        // unflushed page cache.
        if self.writable {
            let _ = self.file.sync_data();
        }
        // SAFETY: `self.ptr` was returned by a successful `mmap` of
        // `REGION_SIZE` bytes in `Self::map` and is unmapped exactly once.
        unsafe {
            libc::munmap(self.ptr.cast(), REGION_SIZE);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The 128-byte region header: magic, writer index, era, the provider's
//! last-known real-vs-global offset, and the process-shared writer mutex.

use crate::clock::Era;
use crate::region::mutex::FutexMutex;
use crate::stamp::Stamp;
use std::sync::atomic::{AtomicU32, Ordering};

/// `"BYZTIME"` followed by `\0\xFF\xFF\xFF\xFF`, 12 bytes total.
pub const MAGIC: [u8; 12] = *b"BYZTIME\0\xff\xff\xff\xff";

/// Size of [`RegionHeader`] in bytes, fixed by the on-disk layout
/// documented in `DESIGN.md`. Platforms whose process-shared mutex
/// primitive is larger than a futex word would need to shrink
/// `_reserved`; this implementation's [`FutexMutex`] is 4 bytes, leaving
/// ample room.
pub const HEADER_SIZE: usize = 128;

#[repr(C)]
pub struct RegionHeader {
    magic: [u8; 12],
    index: AtomicU32,
    era: [u8; 16],
    pub real_offset: Stamp,
    pub mutex: FutexMutex,
    _reserved: [u8; HEADER_SIZE - 12 - 4 - 16 - 16 - std::mem::size_of::<FutexMutex>()],
}

const _: () = assert!(std::mem::size_of::<RegionHeader>() == HEADER_SIZE);

impl RegionHeader {
    /// Zero every field including magic. Used only when formatting a brand
    /// new region file before first-time initialization populates it.
    pub fn zero_in_place(&mut self) {
        self.magic = [0; 12];
        self.index.store(0, Ordering::Relaxed);
        self.era = [0; 16];
        self.real_offset = Stamp::ZERO;
        self.mutex.reset();
        self._reserved = [0; HEADER_SIZE - 12 - 4 - 16 - 16 - std::mem::size_of::<FutexMutex>()];
    }

    /// `true` iff the magic bytes match the expected constant.
    /// Acquire-ordered: a reader that observes valid magic is guaranteed to
    /// see every write that happened-before the writer's release store of
    /// magic during init (see [`Self::write_magic`]).
    #[must_use]
    pub fn magic_valid(&self) -> bool {
        std::sync::atomic::fence(Ordering::Acquire);
        self.magic == MAGIC
    }

    /// Store the magic bytes with a preceding release fence, so every
    /// header field written before this call is visible to any reader that
    /// subsequently observes valid magic. Must be the last write of
    /// first-time initialization.
    pub fn write_magic(&mut self) {
        std::sync::atomic::fence(Ordering::Release);
        self.magic = MAGIC;
    }

    #[must_use]
    pub fn era(&self) -> Era {
        std::sync::atomic::fence(Ordering::Acquire);
        Era(self.era)
    }

    /// Store `era` with a preceding release fence. Must be the last write
    /// of reboot re-initialization.
    pub fn write_era(&mut self, era: Era) {
        std::sync::atomic::fence(Ordering::Release);
        self.era = era.0;
    }

    /// Load the writer index. `Acquire` so a subsequent read of the
    /// indexed slot observes that publication's full write.
    #[must_use]
    pub fn load_index(&self) -> u32 {
        self.index.load(Ordering::Acquire)
    }

    /// Store the writer index. `Release` so the slot write preceding this
    /// call is visible to any reader that observes the new index.
    pub fn store_index(&self, index: u32) {
        self.index.store(index, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_exactly_128_bytes() {
        assert_eq!(std::mem::size_of::<RegionHeader>(), 128);
    }

    #[test]
    fn magic_constant_is_byztime_prefixed() {
        assert_eq!(&MAGIC, b"BYZTIME\0\xff\xff\xff\xff");
        assert_eq!(MAGIC.len(), 12);
    }
}

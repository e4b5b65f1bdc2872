// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The provider (writer) side of the protocol: opens the region
//! exclusively, runs first-time/reboot initialization, and publishes new
//! entries. See `DESIGN.md` for the initialization/publish protocol this
//! module implements.

use crate::clock::{ClockSource, SystemClocks};
use crate::error::Result;
use crate::lockfile::{self, LockFile};
use crate::region::entry::{TimedataEntry, NUM_ENTRIES};
use crate::region::MappedRegion;
use crate::stamp::Stamp;
use std::path::Path;

/// Sentinel "unknown" error bound written at first-time and reboot
/// initialization: `2^62`, chosen to be unmistakably larger than any real
/// uncertainty bound while still fitting comfortably inside an `i64`
/// under subsequent arithmetic.
const UNKNOWN_ERROR_SEC: i64 = 1i64 << 62;

/// An open writer handle. Exactly one may exist per region path at a
/// time, enforced by `_lock`.
pub struct ProviderContext<C: ClockSource = SystemClocks> {
    region: MappedRegion,
    _lock: LockFile,
    clock: C,
}

impl ProviderContext<SystemClocks> {
    /// Open (creating if necessary) the region at `path` for writing,
    /// using the host's real clocks.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_rw_with_clock(path, SystemClocks::new())
    }
}

impl<C: ClockSource> ProviderContext<C> {
    /// Open (creating if necessary) the region at `path` for writing,
    /// sourcing `local_time`/`real_time`/`clock_era` from `clock`. Used
    /// directly by tests that need deterministic clocks; production
    /// callers should prefer [`ProviderContext::open_rw`].
    pub fn open_rw_with_clock(path: impl AsRef<Path>, clock: C) -> Result<Self> {
        let path = path.as_ref();
        let lock_path = lockfile::lock_path_for(path)?;
        let lock = LockFile::acquire(&lock_path)?;
        let region = MappedRegion::create_rw(path)?;

        let header = region.header();
        let magic_ok = header.magic_valid();
        let index_ok = magic_ok && (header.load_index() as usize) < NUM_ENTRIES;

        if !index_ok {
            Self::first_time_init(&region, &clock)?;
            log::debug!("[byztime] first-time init of region {}", path.display());
        } else if header.era() != clock.clock_era() {
            Self::reboot_reinit(&region, &clock)?;
            log::debug!("[byztime] reboot re-init of region {}", path.display());
        } else {
            log::debug!("[byztime] opened region {} in steady state", path.display());
        }

        // The exclusive file lock just acquired above guarantees no other
        // writer process exists, so resetting the embedded mutex here is
        // always safe and recovers from a previous writer dying while
        // holding it.
        region.header_mut().mutex.reset();

        Ok(Self {
            region,
            _lock: lock,
            clock,
        })
    }

    fn first_time_init(region: &MappedRegion, clock: &C) -> Result<()> {
        let local_now = clock.local_time()?;
        let real_now = clock.real_time()?;
        let (offset, _overflow) = real_now.sub(local_now);
        let entry = TimedataEntry::new(offset, Stamp::new(UNKNOWN_ERROR_SEC, 0), local_now);

        let header = region.header_mut();
        header.real_offset = Stamp::ZERO;
        unsafe {
            region.write_entry(0, &entry);
        }
        header.store_index(0);
        header.write_era(clock.clock_era());
        header.write_magic();
        Ok(())
    }

    fn reboot_reinit(region: &MappedRegion, clock: &C) -> Result<()> {
        let local_now = clock.local_time()?;
        let real_now = clock.real_time()?;
        let real_offset = region.header().real_offset;
        let (adjusted_real, o1) = real_now.add(real_offset);
        let (offset, o2) = adjusted_real.sub(local_now);
        if o1 || o2 {
            return Err(crate::error::Error::Overflow);
        }
        let entry = TimedataEntry::new(offset, Stamp::new(UNKNOWN_ERROR_SEC, 0), local_now);

        unsafe {
            region.write_entry(0, &entry);
        }
        region.header().store_index(0);
        region.header_mut().write_era(clock.clock_era());
        Ok(())
    }

    /// Publish a new entry into the next ring slot under the writer
    /// mutex. If `as_of` is omitted, `local_time()` is read now.
    pub fn set_offset(&mut self, offset: Stamp, error: Stamp, as_of: Option<Stamp>) -> Result<()> {
        let as_of = match as_of {
            Some(s) => s,
            None => self.clock.local_time()?,
        };
        let entry = TimedataEntry::new(offset, error, as_of);

        let header = self.region.header();
        header.mutex.lock();
        let next = (header.load_index() + 1) % NUM_ENTRIES as u32;
        unsafe {
            self.region.write_entry(next, &entry);
        }
        header.store_index(next);
        header.mutex.unlock();
        Ok(())
    }

    /// Non-locking accessor returning the entry at the current writer
    /// index, unchanged. Intended for diagnostic/pass-through use inside
    /// the writer process; identical to [`Self::get_offset_raw`] — both
    /// names are part of the public surface, kept as synonyms rather than
    /// picking one.
    #[must_use]
    pub fn get_offset_quick(&self) -> TimedataEntry {
        self.get_offset_raw()
    }

    /// See [`Self::get_offset_quick`].
    #[must_use]
    pub fn get_offset_raw(&self) -> TimedataEntry {
        let header = self.region.header();
        let index = header.load_index();
        // SAFETY: `index` was just loaded from the header we wrote, so it
        // is in range by construction; this is the writer's own process.
        unsafe { self.region.read_entry(index) }
    }

    /// Recompute and store `real_offset` under the mutex, so a later
    /// reboot's re-init has a useful starting guess even before any
    /// network sync completes.
    pub fn update_real_offset(&mut self) -> Result<()> {
        let entry = self.get_offset_raw();
        let local_now = self.clock.local_time()?;
        let (global, o1) = entry.offset.add(local_now);
        let real_now = self.clock.real_time()?;
        let (real_offset, o2) = global.sub(real_now);
        if o1 || o2 {
            return Err(crate::error::Error::Overflow);
        }

        let header = self.region.header();
        header.mutex.lock();
        self.region.header_mut().real_offset = real_offset;
        header.mutex.unlock();
        Ok(())
    }
}

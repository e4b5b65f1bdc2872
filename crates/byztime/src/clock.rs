// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host clock adapters: the three pure external collaborators this crate
//! consumes rather than implements. Production code gets
//! `local_time`/`real_time` from `CLOCK_MONOTONIC_RAW`/`CLOCK_REALTIME` and
//! `clock_era` from the kernel's per-boot random ID — the same "read a
//! kernel-exposed stable identifier" technique used for a cross-process
//! host identity, pointed instead at a value that is *supposed* to change
//! across reboots rather than staying fixed. See `DESIGN.md`.

use crate::error::{Error, Result};
use crate::stamp::Stamp;
use std::fmt;
use std::sync::Mutex;

/// 16-byte opaque identifier for the local monotonic clock's current
/// continuity epoch. Changes iff `local_time` readings taken before and
/// after become incomparable (e.g. a reboot).
///
/// Known limitation: suspend-to-RAM can disturb monotonic time without
/// changing the era on hosts where the era is sourced from a boot ID.
/// This crate does not paper over it.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Era(pub [u8; 16]);

impl fmt::Debug for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Era(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Host-supplied clock and era sources.
///
/// The production implementation is [`SystemClocks`]; tests inject a fake
/// implementation to drive deterministic end-to-end cases that pin
/// `local_time`/`real_time` to exact values.
pub trait ClockSource: Send + Sync {
    /// Strictly monotonic, non-decreasing between successive calls on the
    /// same process while the era is stable. Backed by a
    /// `CLOCK_MONOTONIC_RAW`-quality source.
    fn local_time(&self) -> Result<Stamp>;

    /// Wall-clock seconds since the POSIX epoch.
    fn real_time(&self) -> Result<Stamp>;

    /// Opaque identifier for the current local-clock continuity epoch.
    fn clock_era(&self) -> Era;
}

/// Production [`ClockSource`] backed by the host's real clocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClocks;

impl SystemClocks {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_clock(clock_id: libc::clockid_t) -> Result<Stamp> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, stack-allocated `timespec` and `clock_id`
        // is one of the fixed constants below; `clock_gettime` only writes
        // through the pointer we pass.
        let rc = unsafe { libc::clock_gettime(clock_id, &mut ts) };
        if rc != 0 {
            return Err(Error::ClockFailure(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(Stamp::new(ts.tv_sec as i64, i64::from(ts.tv_nsec)))
    }
}

impl ClockSource for SystemClocks {
    fn local_time(&self) -> Result<Stamp> {
        Self::read_clock(libc::CLOCK_MONOTONIC_RAW)
    }

    fn real_time(&self) -> Result<Stamp> {
        Self::read_clock(libc::CLOCK_REALTIME)
    }

    fn clock_era(&self) -> Era {
        boot_id_era().unwrap_or_else(|| {
            log::warn!("[byztime] /proc/sys/kernel/random/boot_id unavailable, using zero era");
            Era::default()
        })
    }
}

/// Read the kernel's per-boot random UUID and pack its 16 bytes directly
/// into an [`Era`]. This changes every reboot, which is exactly the
/// contract `clock_era()` promises.
fn boot_id_era() -> Option<Era> {
    let text = std::fs::read_to_string("/proc/sys/kernel/random/boot_id").ok()?;
    let hex: String = text.chars().filter(u8::is_ascii_hexdigit).collect();
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for (i, chunk) in bytes.iter_mut().enumerate() {
        *chunk = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(Era(bytes))
}

/// A [`ClockSource`] whose readings are set explicitly rather than sampled
/// from the OS. Used by this crate's own integration tests to drive
/// deterministic end-to-end cases, and equally useful to downstream
/// embedders who want deterministic tests of code layered on `byztime`.
pub struct ManualClocks {
    local: Mutex<Stamp>,
    real: Mutex<Stamp>,
    era: Mutex<Era>,
}

impl ManualClocks {
    #[must_use]
    pub fn new(local: Stamp, real: Stamp, era: Era) -> Self {
        Self {
            local: Mutex::new(local),
            real: Mutex::new(real),
            era: Mutex::new(era),
        }
    }

    pub fn set_local(&self, t: Stamp) {
        *self.local.lock().expect("ManualClocks local mutex poisoned") = t;
    }

    pub fn set_real(&self, t: Stamp) {
        *self.real.lock().expect("ManualClocks real mutex poisoned") = t;
    }

    pub fn set_era(&self, era: Era) {
        *self.era.lock().expect("ManualClocks era mutex poisoned") = era;
    }
}

impl ClockSource for ManualClocks {
    fn local_time(&self) -> Result<Stamp> {
        Ok(*self.local.lock().expect("ManualClocks local mutex poisoned"))
    }

    fn real_time(&self) -> Result<Stamp> {
        Ok(*self.real.lock().expect("ManualClocks real mutex poisoned"))
    }

    fn clock_era(&self) -> Era {
        *self.era.lock().expect("ManualClocks era mutex poisoned")
    }
}

impl<T: ClockSource + ?Sized> ClockSource for std::sync::Arc<T> {
    fn local_time(&self) -> Result<Stamp> {
        (**self).local_time()
    }

    fn real_time(&self) -> Result<Stamp> {
        (**self).real_time()
    }

    fn clock_era(&self) -> Era {
        (**self).clock_era()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linux futex wrapper and the process-shared mutex built on it.
//!
//! # CRITICAL: SHARED vs PRIVATE
//!
//! This module uses `FUTEX_WAIT`/`FUTEX_WAKE` (NOT the `_PRIVATE` variants).
//! The `_PRIVATE` variants only work within a single process and will
//! silently fail to wake waiters in other processes — fatal for a mutex
//! embedded in a file mapped `MAP_SHARED` across writer and reader
//! processes.

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const FUTEX_WAIT: i32 = 0; // NOT 128 (FUTEX_WAIT_PRIVATE)
const FUTEX_WAKE: i32 = 1; // NOT 129 (FUTEX_WAKE_PRIVATE)

#[cfg(target_os = "linux")]
fn futex_wait(addr: &AtomicU32, expected: u32, timeout: Option<Duration>) -> i32 {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(d.subsec_nanos() as i32),
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: `addr` is a valid reference to shared memory for the
    // duration of this call; FUTEX_WAIT (not _PRIVATE) is required for
    // cross-process wakeups.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAIT,
            expected,
            ts_ptr,
            ptr::null::<u32>(),
            0i32,
        ) as i32
    }
}

#[cfg(target_os = "linux")]
fn futex_wake_all(addr: &AtomicU32) -> i32 {
    // SAFETY: `addr` is a valid reference to shared memory; FUTEX_WAKE
    // (not _PRIVATE) reaches waiters in other processes.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAKE,
            i32::MAX,
            ptr::null::<libc::timespec>(),
            ptr::null::<u32>(),
            0i32,
        ) as i32
    }
}

#[cfg(not(target_os = "linux"))]
fn futex_wait(_addr: &AtomicU32, _expected: u32, timeout: Option<Duration>) -> i32 {
    std::thread::sleep(timeout.unwrap_or(Duration::from_micros(50)).min(Duration::from_millis(5)));
    0
}

#[cfg(not(target_os = "linux"))]
fn futex_wake_all(_addr: &AtomicU32) -> i32 {
    0
}

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A futex-backed mutex that fits in the region header and is safe to use
/// across processes sharing the `mmap`.
///
/// This mutex exists only to make concurrent writers within a single
/// (misbehaving or wrapper-forked) writer process defined behavior. The
/// sidecar file lock already guarantees a single writer process; readers
/// never touch this mutex at all.
#[repr(C)]
pub struct FutexMutex {
    state: AtomicU32,
}

impl FutexMutex {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Reset to the unlocked state. Safe to call whenever the exclusive
    /// sidecar file lock is held by the caller (guarantees no other writer
    /// process exists), which is how `open_rw` recovers from a previous
    /// writer dying mid-hold.
    pub fn reset(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    pub fn lock(&self) {
        loop {
            if self
                .state
                .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            futex_wait(&self.state, LOCKED, None);
        }
    }

    pub fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
        futex_wake_all(&self.state);
    }
}

impl Default for FutexMutex {
    fn default() -> Self {
        Self::new()
    }
}

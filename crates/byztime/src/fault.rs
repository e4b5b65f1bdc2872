// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Page-fault recovery for consumer reads of a region that a buggy or
//! hostile writer process may have truncated out from under us. See
//! `DESIGN.md` for why this crate recovers from `SIGBUS` rather than
//! relying on the size check alone.
//!
//! `fstat`-then-`mmap` is racy: nothing stops the writer from truncating
//! the file a moment after the size check passes. Reading a page beyond
//! the new EOF then raises `SIGBUS`. This module turns that into an
//! ordinary `ProtocolError` instead of a crash, using the same
//! `sigsetjmp`/`siglongjmp` technique C libraries use to recover from
//! synchronous faults: a resumption point is recorded in thread-local
//! storage before the risky access, and the signal handler jumps back to
//! it instead of letting the default disposition dump core. The
//! technique follows the standard C pattern used by, e.g., JIT runtimes
//! and database engines that protect a read against a trap-raising
//! access.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::os::raw::{c_int, c_void};
use std::sync::OnceLock;

/// Opaque, generously-sized buffer for `sigsetjmp`/`siglongjmp`. The real
/// `sigjmp_buf` is considerably smaller on every platform glibc/musl
/// support; we over-allocate rather than pin down the exact struct layout,
/// which libc's C ABI does not expose to Rust.
#[repr(C, align(16))]
struct SigJmpBuf([u8; 256]);

impl SigJmpBuf {
    const fn new() -> Self {
        Self([0; 256])
    }
}

extern "C" {
    #[link_name = "sigsetjmp"]
    fn sigsetjmp_raw(env: *mut SigJmpBuf, savesigs: c_int) -> c_int;
    #[link_name = "siglongjmp"]
    fn siglongjmp_raw(env: *mut SigJmpBuf, val: c_int) -> !;
}

thread_local! {
    /// Non-null while a thread is inside [`with_fault_scope`]; the signal
    /// handler reads this to decide whether to recover or forward the
    /// signal. Cleared with release-equivalent semantics on scope exit via
    /// the compiler fence in [`with_fault_scope`].
    static SCOPE: Cell<*mut SigJmpBuf> = const { Cell::new(std::ptr::null_mut()) };
}

static PRIOR_HANDLER: OnceLock<libc::sigaction> = OnceLock::new();

/// Install the `SIGBUS` handler that makes [`with_fault_scope`] able to
/// recover from a fault. Must be called once by the host application
/// before any consumer read that should survive a truncated region; the
/// library does not install it implicitly.
///
/// # Errors
/// Returns [`Error::Io`] if `sigaction` fails.
pub fn install_fault_handler() -> Result<()> {
    let mut new_action: libc::sigaction = unsafe { std::mem::zeroed() };
    new_action.sa_sigaction = handle_fault as usize;
    new_action.sa_flags = libc::SA_SIGINFO;
    // SAFETY: `new_action.sa_mask` is a plain value type; `sigemptyset`
    // only writes through the pointer we pass.
    unsafe {
        libc::sigemptyset(&mut new_action.sa_mask);
    }

    let mut old_action: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers reference validly initialized `sigaction`
    // values for the duration of the call.
    let rc = unsafe { libc::sigaction(libc::SIGBUS, &new_action, &mut old_action) };
    if rc != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let _ = PRIOR_HANDLER.set(old_action);
    Ok(())
}

/// Run `f` inside a fault-recovery scope: a synchronous `SIGBUS` raised by
/// an access performed inside `f` causes this function to return
/// `Err(Error::Protocol(..))` instead of crashing the process. Nestable
/// only by replacement — an inner scope overwrites the outer one's
/// resumption point for its duration and restores it on exit.
///
/// Requires [`install_fault_handler`] to have been called; without it, a
/// `SIGBUS` still crashes the process exactly as if this function had not
/// been used.
pub fn with_fault_scope<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let mut env = SigJmpBuf::new();
    let previous = SCOPE.with(Cell::get);

    // SAFETY: `env` is a valid, stack-allocated `SigJmpBuf` for the
    // duration of this function.
    let rc = unsafe { sigsetjmp_raw(&mut env, 1) };
    if rc != 0 {
        SCOPE.with(|s| s.set(previous));
        return Err(Error::Protocol(
            "SIGBUS while reading the shared region (truncated or corrupt backing file)".into(),
        ));
    }

    SCOPE.with(|s| s.set(&mut env));
    std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
    let result = f();
    std::sync::atomic::fence(std::sync::atomic::Ordering::Acquire);
    SCOPE.with(|s| s.set(previous));
    result
}

/// The installed `SIGBUS` handler. If the faulting thread is inside a
/// [`with_fault_scope`] call, jumps back to
/// that scope's resumption point; otherwise forwards to whatever
/// disposition was active before [`install_fault_handler`] ran.
///
/// # Safety
/// Must only ever be installed via `sigaction` as a `SIGBUS` handler; it
/// is not meaningful to call directly.
extern "C" fn handle_fault(signo: c_int, info: *mut libc::siginfo_t, ctx: *mut c_void) {
    let _ = (info, ctx);
    let env_ptr = SCOPE.with(Cell::get);
    if env_ptr.is_null() {
        forward_to_prior_handler(signo);
        return;
    }
    // SAFETY: `env_ptr` was populated by a live `with_fault_scope` call
    // still on this thread's stack (it clears the slot before returning),
    // so the buffer is still valid to jump back into.
    unsafe {
        siglongjmp_raw(env_ptr, 1);
    }
}

fn forward_to_prior_handler(signo: c_int) {
    if let Some(prior) = PRIOR_HANDLER.get() {
        let handler = prior.sa_sigaction;
        if handler == libc::SIG_DFL {
            // SAFETY: restoring the default disposition and re-raising is
            // the standard way to reproduce "no handler was installed".
            unsafe {
                libc::signal(signo, libc::SIG_DFL);
                libc::raise(signo);
            }
        } else if handler != libc::SIG_IGN {
            // SAFETY: `handler` is a valid `sigaction`-style function
            // pointer captured from the previous disposition.
            let f: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
                unsafe { std::mem::transmute(handler) };
            f(signo, std::ptr::null_mut(), std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_with_no_fault_returns_the_inner_value() {
        let result = with_fault_scope(|| Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn nested_scopes_restore_the_outer_resumption_point() {
        let outer = with_fault_scope(|| {
            let inner = with_fault_scope(|| Ok::<_, Error>(1));
            inner.map(|v| v + 1)
        });
        assert_eq!(outer.unwrap(), 2);
    }
}

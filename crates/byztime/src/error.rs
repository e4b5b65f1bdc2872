// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the shared-memory time-sync protocol.

use std::fmt;
use std::io;

/// Errors surfaced by `byztime`.
///
/// Every fallible operation in this crate reports one of these kinds;
/// nothing is silently retried. The only condition recovered internally is
/// a page fault during a consumer read, which is translated to
/// [`Error::Protocol`].
#[derive(Debug)]
pub enum Error {
    /// An arithmetic operation on a `Stamp` exceeded `i64`. The wrapped,
    /// two's-complement result was still produced and is available to the
    /// caller; this variant only reports that it happened.
    Overflow,

    /// The region is malformed: too small, missing magic, an out-of-range
    /// writer index, a denormalized Stamp, or a page-boundary fault while
    /// reading it.
    Protocol(String),

    /// `magic` is valid but the stored `era` does not match the current
    /// `clock_era()`. No provider is running for this boot.
    EraMismatch,

    /// A writer context is already open against this region.
    Busy,

    /// `slew()` was called while the fresh entry's `error` exceeded the
    /// caller-supplied `maxerror`.
    OutOfRange,

    /// The host's local or real clock read failed.
    ClockFailure(String),

    /// Opening, mapping, locking, or stat-ing a file failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::EraMismatch => write!(f, "clock era mismatch: no live provider for this boot"),
            Self::Busy => write!(f, "writer lock already held"),
            Self::OutOfRange => write!(f, "entry error bound exceeds maxerror"),
            Self::ClockFailure(msg) => write!(f, "clock read failed: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result type for `byztime` operations.
pub type Result<T> = std::result::Result<T, Error>;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-point (seconds, nanoseconds) arithmetic.
//!
//! `Stamp` is the value type every other module in this crate builds on: the
//! wire format of ring entries (`offset`/`error`/`as_of`), the shape of
//! `local_time()`/`real_time()` readings, and the unit the slew state
//! machine clamps. Every operation that can overflow `i64` reports it
//! explicitly and still produces the wrapped, two's-complement result —
//! mirrored here as Rust's own `overflowing_*` convention (`(value,
//! overflow)` tuples), the same shape `i64::overflowing_add` already uses.

use std::cmp::Ordering;
use std::fmt;

/// Nanoseconds per second; also the base of the parts-per-billion scale.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A `(seconds, nanoseconds)` fixed-point duration or instant.
///
/// Normalized form has `0 <= nanoseconds < NANOS_PER_SEC`; negative total
/// times are represented by a negative `sec` with a non-negative `nsec`
/// (e.g. `-0.25s` is `Stamp { sec: -1, nsec: 750_000_000 }`).
///
/// This is also the on-the-wire layout of a Stamp inside a shared-memory
/// region (see [`crate::region::entry`]): `#[repr(C)]`, host byte order,
/// 16 bytes, 8-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stamp {
    pub sec: i64,
    pub nsec: i64,
}

impl Stamp {
    /// The zero duration / instant.
    pub const ZERO: Stamp = Stamp { sec: 0, nsec: 0 };

    #[inline]
    #[must_use]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// Push `nsec` into `[0, NANOS_PER_SEC)`, carrying into `sec`.
    ///
    /// Reports overflow if any of the internal checked adjustments wrapped;
    /// the returned value is always the two's-complement wrapped result
    /// regardless.
    #[must_use]
    pub fn normalize(self) -> (Stamp, bool) {
        let (sec, nsec, overflow) = normalize_parts(self.sec, self.nsec);
        (Stamp { sec, nsec }, overflow)
    }

    /// `self + other`, normalized.
    #[must_use]
    pub fn add(self, other: Stamp) -> (Stamp, bool) {
        let (a, of_a) = self.normalize();
        let (b, of_b) = other.normalize();
        let (sec, of_sec) = a.sec.overflowing_add(b.sec);
        let (nsec, of_nsec) = a.nsec.overflowing_add(b.nsec);
        let (result, of_norm) = Stamp { sec, nsec }.normalize();
        (result, of_a || of_b || of_sec || of_nsec || of_norm)
    }

    /// `self - other`, normalized. The intermediate `nsec` difference may be
    /// negative before the final normalize folds it back into `[0, 1e9)`.
    #[must_use]
    pub fn sub(self, other: Stamp) -> (Stamp, bool) {
        let (a, of_a) = self.normalize();
        let (b, of_b) = other.normalize();
        let (sec, of_sec) = a.sec.overflowing_sub(b.sec);
        let (nsec, of_nsec) = a.nsec.overflowing_sub(b.nsec);
        let (result, of_norm) = Stamp { sec, nsec }.normalize();
        (result, of_a || of_b || of_sec || of_nsec || of_norm)
    }

    /// Lexicographic `(sec, nsec)` comparison after normalizing (unchecked)
    /// copies of both sides. Returns `-1`, `0`, or `1`.
    #[must_use]
    pub fn compare(self, other: Stamp) -> i32 {
        let (a, _) = self.normalize();
        let (b, _) = other.normalize();
        match a.sec.cmp(&b.sec) {
            Ordering::Less => -1,
            Ordering::Greater => 1,
            Ordering::Equal => match a.nsec.cmp(&b.nsec) {
                Ordering::Less => -1,
                Ordering::Greater => 1,
                Ordering::Equal => 0,
            },
        }
    }

    /// Halve the Stamp (divide by 2). Never fails. Non-normalized input may
    /// yield non-normalized output.
    #[must_use]
    pub fn halve(self) -> Stamp {
        let mut sec = self.sec >> 1;
        let mut nsec = self.nsec >> 1;
        if self.sec & 1 != 0 {
            nsec += NANOS_PER_SEC / 2;
        }
        // The shift drops one bit of `nsec`. When the original low two bits
        // are both set (mod 4 == 3) the drop is an exact tie *and* the
        // truncated quotient is odd; nudge to the nearest even value,
        // signed by the dropped operand.
        if self.nsec & 0b11 == 0b11 {
            if self.nsec >= 0 {
                nsec += 1;
            } else {
                nsec -= 1;
            }
        }
        Stamp { sec, nsec }
    }

    /// Scale by a parts-per-billion rational `ppb / NANOS_PER_SEC`.
    ///
    /// Internally splits `sec = giga * 1e9 + sec_rem` and
    /// `ppb = parts * 1e9 + nanoparts`, forms the six cross products of a
    /// schoolbook long multiplication, and recombines them. `giga * parts`
    /// is the only product that can overflow `i64` and is checked
    /// explicitly; the rest is accumulated in `i128` so that only the final
    /// fold back into `i64` can overflow. The attosecond-scale remainder
    /// (`nsec * nanoparts`) is rounded half-to-even, sign-aware, before
    /// being folded into nanoseconds.
    #[must_use]
    pub fn scale(self, ppb: i64) -> (Stamp, bool) {
        let sec = self.sec;
        let nsec = self.nsec;

        let giga = sec / NANOS_PER_SEC;
        let sec_rem = sec % NANOS_PER_SEC;

        // Fast path: 0 <= ppb <= 1e9 means parts is always 0 (or the
        // degenerate ppb == 1e9 identity case), so the giga*parts and
        // sec_rem*parts/giga*nanoparts high partials can't contribute.
        let (parts, nanoparts) = if (0..=NANOS_PER_SEC).contains(&ppb) {
            (0i64, ppb)
        } else {
            (ppb / NANOS_PER_SEC, ppb % NANOS_PER_SEC)
        };

        let (term1, of_term1) = giga.overflowing_mul(parts);

        let term2 = i128::from(giga) * i128::from(nanoparts);
        let term3 = i128::from(sec_rem) * i128::from(parts);
        let term4 = i128::from(sec_rem) * i128::from(nanoparts);
        let term5 = i128::from(nsec) * i128::from(parts);
        let term6 = i128::from(nsec) * i128::from(nanoparts);

        let ns_sum = term4 + term5 + round_half_even_div(term6, i128::from(NANOS_PER_SEC));
        let sec_from_cross = term2 + term3;

        let (raw_sec, of_sec_cast) = i128_to_i64_wrapping(
            i128::from(term1) * i128::from(NANOS_PER_SEC) + sec_from_cross,
        );
        let (raw_nsec, of_nsec_cast) = i128_to_i64_wrapping(ns_sum);

        let (result, of_combine) = Stamp::new(raw_sec, 0).add(Stamp::new(0, raw_nsec));

        (
            result,
            of_term1 || of_sec_cast || of_nsec_cast || of_combine,
        )
    }

    /// Human-readable `"<sec>.<9-digit nsec>"` form. Negative total times
    /// print as a single signed decimal (`-0.25s` is `Stamp{-1, 750_000_000}`
    /// which prints as `-0.250000000`, not `-1.750000000`).
    pub fn format(self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sec < 0 && self.nsec != 0 {
            let sec = self.sec + 1;
            let nsec = NANOS_PER_SEC - self.nsec;
            if sec == 0 {
                write!(f, "-0.{nsec:09}")
            } else {
                write!(f, "{sec}.{nsec:09}")
            }
        } else {
            write!(f, "{}.{:09}", self.sec, self.nsec)
        }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.compare(*other) {
            x if x < 0 => Ordering::Less,
            0 => Ordering::Equal,
            _ => Ordering::Greater,
        }
    }
}

fn normalize_parts(sec: i64, nsec: i64) -> (i64, i64, bool) {
    let mut overflow = false;
    let q = nsec / NANOS_PER_SEC;
    let mut r = nsec % NANOS_PER_SEC;
    let (mut sec, of1) = sec.overflowing_add(q);
    overflow |= of1;
    if r < 0 {
        r += NANOS_PER_SEC;
        let (sec2, of2) = sec.overflowing_sub(1);
        sec = sec2;
        overflow |= of2;
    }
    (sec, r, overflow)
}

/// Round `x / base` to the nearest integer, ties to even, sign-aware.
fn round_half_even_div(x: i128, base: i128) -> i128 {
    let q = x / base;
    let r = x % base;
    let half = base / 2;
    let abs_r = r.abs();
    if abs_r > half || (abs_r == half && q % 2 != 0) {
        if r > 0 {
            q + 1
        } else {
            q - 1
        }
    } else {
        q
    }
}

fn i128_to_i64_wrapping(x: i128) -> (i64, bool) {
    let overflow = x > i128::from(i64::MAX) || x < i128::from(i64::MIN);
    (x as i64, overflow)
}

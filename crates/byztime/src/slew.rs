// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The slew state machine: rate-limits the visible global-time estimate so
//! it cannot jump discontinuously or run backwards across successive
//! reads.

use crate::error::{Error, Result};
use crate::region::entry::TimedataEntry;
use crate::stamp::Stamp;

/// `max_rate` value meaning "no upper bound".
pub const NO_UPPER_BOUND: i64 = i64::MAX;

/// A consumer's estimation mode. `Context` holds exactly one `Mode` value
/// rather than dispatching through a trait object — a closed, small set
/// of mutually exclusive states fits a tagged enum better than
/// inheritance.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Discontinuous: `est` is always the fresh entry's offset.
    Step,
    /// Clamps `est` so consecutive reads' implied global-time rate stays
    /// within `[min_rate_ppb, max_rate_ppb]`.
    Slew {
        min_rate_ppb: i64,
        max_rate_ppb: i64,
        /// `(local_time, offset_emitted)` of the previous read, absent
        /// immediately after entering `Slew`.
        prev: Option<(Stamp, Stamp)>,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Step
    }
}

impl Mode {
    /// Enter (or re-enter) `Slew` mode. `entry` and `maxerror` implement
    /// an optional rejection: if `entry.error > maxerror`, the mode is
    /// left unchanged and `OutOfRange` is returned.
    pub fn slew(
        &mut self,
        min_rate_ppb: i64,
        max_rate_ppb: i64,
        entry: &TimedataEntry,
        maxerror: Option<Stamp>,
    ) -> Result<()> {
        if let Some(maxerror) = maxerror {
            if entry.error.compare(maxerror) > 0 {
                return Err(Error::OutOfRange);
            }
        }
        *self = Mode::Slew {
            min_rate_ppb,
            max_rate_ppb,
            prev: None,
        };
        Ok(())
    }

    /// Unconditionally switch to `Step`. Always succeeds.
    pub fn step(&mut self) {
        *self = Mode::Step;
    }

    /// Compute the emitted `est` for a freshly read `entry` at `local_now`,
    /// updating any internal clamp state. Returns the overflow flag from
    /// any Stamp arithmetic performed along the way.
    pub fn estimate(&mut self, entry: &TimedataEntry, local_now: Stamp) -> (Stamp, bool) {
        match self {
            Mode::Step => (entry.offset, false),
            Mode::Slew {
                min_rate_ppb,
                max_rate_ppb,
                prev,
            } => {
                let mut overflow = false;
                let est = match *prev {
                    None => entry.offset,
                    Some((prev_local, prev_offset)) => {
                        let (delta_local, o1) = local_now.sub(prev_local);
                        let (delta_offset, o2) = entry.offset.sub(prev_offset);
                        let (delta_global, o3) = delta_local.add(delta_offset);
                        overflow |= o1 || o2 || o3;

                        let (delta_global_min, o4) = delta_local.scale(*min_rate_ppb);
                        overflow |= o4;

                        if delta_global.compare(delta_global_min) < 0 {
                            let (shortfall, o5) = delta_global_min.sub(delta_global);
                            let (est, o6) = entry.offset.add(shortfall);
                            overflow |= o5 || o6;
                            est
                        } else if *max_rate_ppb < NO_UPPER_BOUND {
                            let (delta_global_max, o7) = delta_local.scale(*max_rate_ppb);
                            overflow |= o7;
                            if delta_global.compare(delta_global_max) > 0 {
                                let (excess, o8) = delta_global.sub(delta_global_max);
                                let (est, o9) = entry.offset.sub(excess);
                                overflow |= o8 || o9;
                                est
                            } else {
                                entry.offset
                            }
                        } else {
                            entry.offset
                        }
                    }
                };
                *prev = Some((local_now, est));
                (est, overflow)
            }
        }
    }
}

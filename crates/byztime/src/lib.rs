// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory IPC between a Byzantine-fault-tolerant time provider and
//! local consumer processes.
//!
//! A single *provider* (the time-synchronization daemon) publishes its
//! best estimate of the offset between a machine-local monotonic clock and
//! a global time reference, together with an uncertainty bound, into a
//! fixed-size memory-mapped region. Arbitrarily many *consumer* processes
//! read the latest estimate and derive bounded `(min, est, max)` triples
//! for either the offset or the global wall time.
//!
//! ```no_run
//! use byztime::{ConsumerContext, ProviderContext, Stamp};
//!
//! # fn main() -> byztime::Result<()> {
//! let mut provider = ProviderContext::open_rw("/run/byztime/region")?;
//! provider.set_offset(Stamp::new(0, 0), Stamp::new(0, 1_000_000), None)?;
//!
//! let mut consumer = ConsumerContext::open_ro("/run/byztime/region")?;
//! let bounds = consumer.get_global_time()?;
//! println!("global time estimate: {}", bounds.est);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod consumer;
pub mod error;
pub mod fault;
mod lockfile;
pub mod provider;
pub mod region;
pub mod slew;
pub mod stamp;

pub use clock::{ClockSource, Era, ManualClocks, SystemClocks};
pub use consumer::{Bounds, ConsumerContext, DEFAULT_DRIFT_PPB};
pub use error::{Error, Result};
pub use fault::{install_fault_handler, with_fault_scope};
pub use provider::ProviderContext;
pub use region::entry::{TimedataEntry, NUM_ENTRIES};
pub use region::header::MAGIC;
pub use region::{MappedRegion, REGION_SIZE};
pub use slew::{Mode, NO_UPPER_BOUND};
pub use stamp::Stamp;

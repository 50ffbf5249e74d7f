//! Time source abstraction.
//!
//! Birthdays are civil dates, so "today" is always evaluated in the local
//! offset of the clock, never in UTC.

use chrono::{DateTime, FixedOffset, Local};

/// Provides the current instant together with its local offset.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

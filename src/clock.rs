use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of span timestamps, in microseconds since the UNIX epoch.
///
/// Spans record whatever the clock says. A clock that jumps backwards can
/// produce zero or inverted durations; that is a property of the clock, not
/// something the tracer corrects.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time in epoch microseconds.
    fn now_micros(&self) -> u64;
}

/// Default [`Clock`] backed by [`SystemTime`].
#[derive(Clone, Debug, Default)]
pub struct SystemClock {
    _private: (),
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        SystemClock { _private: () }
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros() as u64)
            .unwrap_or(0)
    }
}

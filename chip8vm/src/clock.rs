//! Software clock.
use std::time::Duration;

use crate::constants::*;

/// Clock frequency, in hertz (per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Hz(pub u64);

impl Default for Hz {
    fn default() -> Self {
        Hz(CPU_FREQUENCY)
    }
}

impl Hz {
    /// Highest frequency whose cycle still lasts at least a nanosecond.
    pub const MAX: Hz = Hz(NANOS_IN_SECOND);

    /// Whether a clock running at this frequency produces any cycles.
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= Self::MAX.0
    }
}

/// Cycle time of the frequency. Zero when the frequency is not valid.
impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.is_valid() {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        } else {
            Duration::ZERO
        }
    }
}

/// Accumulator converting elapsed time into whole clock cycles.
///
/// It is designed to work with the yielding cooperative pattern
/// of the host loop. The host measures how much time passed since it last
/// resumed the VM, and the clock reports how many cycles fit in that time.
/// Left over time is carried to the next call, so no cycles are lost
/// to rounding.
///
/// A clock with a zero interval never produces cycles. See [`Hz::is_valid`].
#[derive(Debug, Clone)]
pub struct Clock {
    interval: Duration,
    elapsed: Duration,
}

impl Clock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
        }
    }

    pub fn from_hz(freq: Hz) -> Self {
        Self::new(freq.into())
    }

    /// Time a single cycle takes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Add elapsed time, and return the number of whole cycles that passed.
    ///
    /// Cycles beyond `u32::MAX` in a single call are dropped.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        if self.interval.is_zero() {
            return 0;
        }

        let interval = self.interval.as_nanos();
        let total = self.elapsed.saturating_add(elapsed).as_nanos();

        let rest = total % interval;
        let nanos = NANOS_IN_SECOND as u128;
        self.elapsed = Duration::new((rest / nanos) as u64, (rest % nanos) as u32);

        u32::try_from(total / interval).unwrap_or(u32::MAX)
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

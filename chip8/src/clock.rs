//! CPU Clock.
use std::time::Duration;

use crate::constants::*;

/// Software clock that converts elapsed time into discrete cycles.
///
/// It is designed to work with the yielding cooperative pattern
/// of the interpreter loop. When the VM yields control back to the
/// caller, time elapses until it is resumed. The caller reports the
/// elapsed time, which is accumulated until a full cycle has passed.
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    /// Length of one cycle in microseconds.
    period: f64,
    /// Microseconds accumulated since the last cycle.
    elapsed: f64,
}

impl Clock {
    /// Creates a clock ticking at the given frequency.
    ///
    /// A frequency of zero is unthrottled, and ticks on every check.
    pub(crate) fn new(frequency: u64) -> Self {
        let period = if frequency == 0 {
            0.0
        } else {
            MICROS_IN_SECOND / frequency as f64
        };

        Self {
            period,
            elapsed: 0.0,
        }
    }

    /// Set the clock state back to zero.
    pub(crate) fn reset(&mut self) {
        self.elapsed = 0.0;
    }

    pub(crate) fn accumulate(&mut self, elapsed: Duration) {
        self.elapsed += elapsed.as_nanos() as f64 / 1000.0;
    }

    /// Consume one cycle if enough time has accumulated.
    ///
    /// Only a single cycle is drained, the remainder after modulo is kept.
    /// If the caller stalled for many cycles, the backlog is dropped rather
    /// than trying to catch up.
    pub(crate) fn tick(&mut self) -> bool {
        if self.period <= 0.0 {
            self.elapsed = 0.0;
            return true;
        }

        if self.elapsed >= self.period {
            self.elapsed %= self.period;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_period() {
        let mut clock = Clock::new(DELAY_FREQUENCY);
        clock.accumulate(Duration::from_millis(10));
        assert!(!clock.tick());
        clock.accumulate(Duration::from_millis(7));
        assert!(clock.tick());
        assert!(!clock.tick());
    }

    #[test]
    fn test_backlog_dropped() {
        let mut clock = Clock::new(1000);
        clock.accumulate(Duration::from_micros(10_500));
        assert!(clock.tick());
        // Remainder of half a cycle is kept.
        assert!(!clock.tick());
        clock.accumulate(Duration::from_micros(500));
        assert!(clock.tick());
    }

    #[test]
    fn test_unthrottled() {
        let mut clock = Clock::new(0);
        assert!(clock.tick());
        assert!(clock.tick());
    }

    #[test]
    fn test_reset() {
        let mut clock = Clock::new(1000);
        clock.accumulate(Duration::from_millis(1));
        clock.reset();
        assert!(!clock.tick());
    }
}

//! Delay and sound timers.

/// Countdown register decremented at 60Hz until it reaches zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer(u8);

impl Timer {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline(always)]
    pub fn set(&mut self, value: u8) {
        self.0 = value;
    }

    #[inline(always)]
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Count down by one, stopping at zero.
    #[inline]
    pub fn tick(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.0.overflowing_sub(1);
        if !underflow {
            self.0 = val;
        }
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.0 > 0
    }
}

//! Interval gating

/// Fires once each time `interval_ms` has elapsed since the last fire
///
/// The last-fired time starts at zero, so the first fire happens once the
/// clock reaches one interval after boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalTimer {
    interval_ms: u32,
    last_fired_ms: u64,
}

impl IntervalTimer {
    /// Create a timer that has never fired
    #[must_use]
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_fired_ms: 0,
        }
    }

    /// Configured interval
    #[must_use]
    pub const fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Change the interval; takes effect at the next check
    pub fn set_interval(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    /// Whether the interval has elapsed at `now_ms`
    #[must_use]
    pub const fn is_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_fired_ms) >= self.interval_ms as u64
    }

    /// Fire if due, recording `now_ms` as the last fire
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.last_fired_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// Count the next interval from `now_ms` without firing
    pub fn restart(&mut self, now_ms: u64) {
        self.last_fired_ms = now_ms;
    }

    /// Time of the last fire
    #[must_use]
    pub const fn last_fired_ms(&self) -> u64 {
        self.last_fired_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fire_after_one_interval() {
        let mut timer = IntervalTimer::new(100);
        assert!(!timer.poll(99));
        assert!(timer.poll(100));
        assert!(!timer.poll(150));
        assert!(timer.poll(200));
    }
}

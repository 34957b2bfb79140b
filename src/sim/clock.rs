use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{SimConfig, SimTime};

/// The global simulation clock shared by every device.
///
/// Tracks the index of the last completed tick; tick 0 is the epoch. The
/// counter is atomic so readers (command issue times, API handlers) never
/// wait on the scheduler.
///
/// # Examples
///
/// ```
/// use home_energy_sim::sim::clock::SimClock;
/// use home_energy_sim::sim::types::{SimConfig, SimTime};
///
/// let clock = SimClock::new(&SimConfig::new(1000, 60, 0));
/// assert_eq!(clock.advance(), (1, SimTime(60)));
/// assert_eq!(clock.now(), SimTime(60));
/// ```
#[derive(Debug)]
pub struct SimClock {
    /// Last completed tick.
    current: AtomicU64,
    /// Simulated seconds per tick.
    step_seconds: u64,
}

impl SimClock {
    /// Creates a clock at the epoch.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            current: AtomicU64::new(0),
            step_seconds: config.sim_seconds_per_tick,
        }
    }

    /// Index of the last completed tick.
    pub fn tick(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Simulated time of the last completed tick.
    pub fn now(&self) -> SimTime {
        self.time_at(self.tick())
    }

    /// Simulated time of tick `tick`.
    pub fn time_at(&self, tick: u64) -> SimTime {
        SimTime(tick.saturating_mul(self.step_seconds))
    }

    /// Advances by one tick.
    ///
    /// # Returns
    ///
    /// The new tick index and its simulated time.
    pub fn advance(&self) -> (u64, SimTime) {
        let tick = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        (tick, self.time_at(tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock() {
        let clock = SimClock::new(&SimConfig::new(1000, 60, 0));
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.now(), SimTime::ZERO);
    }

    #[test]
    fn test_advance() {
        let clock = SimClock::new(&SimConfig::new(500, 120, 0));
        assert_eq!(clock.advance(), (1, SimTime(60)));
        assert_eq!(clock.advance(), (2, SimTime(120)));
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn time_is_monotonic() {
        let clock = SimClock::new(&SimConfig::new(1000, 60, 0));
        let mut last = clock.now();
        for _ in 0..100 {
            let (_, now) = clock.advance();
            assert!(now > last);
            last = now;
        }
    }
}

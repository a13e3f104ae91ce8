use flowmon_core::SimTime;
use std::time::Instant;

/// A wall-clock anchor for live probes.
///
/// Simulators stamp events with their own timeline; a live probe has
/// nothing but the system clock. `WallClock` fixes the origin of the
/// observation window at construction and converts every later
/// [`now`](WallClock::now) into the [`SimTime`] the monitor expects.
/// Built on [`Instant`], so the timeline is monotonic even when the
/// system clock is adjusted underneath the probe.
///
/// Cloned clocks share the origin by value: a clone handed to another
/// producing thread keeps all timestamps on one timeline.
///
/// # Example
///
/// ```
/// use flowmon::WallClock;
///
/// let clock = WallClock::start();
/// let t0 = clock.now();
/// let t1 = clock.now();
/// assert!(t0 <= t1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Open the observation window now.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Reuse an origin captured earlier, so the monitor's timeline can
    /// be aligned with timestamps the host already records.
    pub fn since(origin: Instant) -> Self {
        Self { origin }
    }

    /// The current point on the observation timeline.
    pub fn now(&self) -> SimTime {
        SimTime::new(self.origin.elapsed())
    }

    /// The origin of the observation window.
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

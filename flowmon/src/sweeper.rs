use crate::{clock::WallClock, shared::SharedMonitor, stop::Stop};
use anyhow::{bail, Context, Result};
use flowmon_core::defaults::DEFAULT_SWEEP_INTERVAL;
use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::debug;

/// A background thread reclaiming lost packets on a wall-clock cadence.
///
/// The core engine only sweeps when told to, which suits simulators
/// driving their own timeline. A live probe has no such driver, so the
/// sweeper calls [`SharedMonitor::sweep`] with the clock's current time
/// every interval until [`shutdown`](Sweeper::shutdown) is called.
///
/// The sweeper must share the clock with the producers feeding the
/// monitor: sweeping with a different timeline would age packets
/// wrongly.
///
/// # Example
///
/// ```
/// use flowmon::{SharedMonitor, Sweeper, WallClock};
///
/// let monitor = SharedMonitor::new();
/// let clock = WallClock::start();
///
/// let sweeper = Sweeper::spawn(monitor.clone(), clock);
/// // ... producers report events with `clock.now()` timestamps ...
/// sweeper.shutdown().unwrap();
/// ```
pub struct Sweeper {
    stop: Arc<Stop>,

    thread: JoinHandle<Result<()>>,
}

impl Sweeper {
    /// Spawn a sweeper with the default cadence
    /// ([`DEFAULT_SWEEP_INTERVAL`]).
    pub fn spawn(monitor: SharedMonitor, clock: WallClock) -> Self {
        Self::spawn_every(monitor, clock, DEFAULT_SWEEP_INTERVAL)
    }

    /// Spawn a sweeper waking up every `interval` of wall-clock time.
    pub fn spawn_every(monitor: SharedMonitor, clock: WallClock, interval: Duration) -> Self {
        let stop = Arc::new(Stop::new());

        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || sweeper_run(monitor, clock, interval, stop))
        };

        Self { stop, thread }
    }

    /// Stop the thread and wait for it, with one final sweep on the way
    /// out so the monitor is ready to report.
    pub fn shutdown(self) -> Result<()> {
        self.stop.toggle();

        match self.thread.join() {
            Err(join_error) => {
                bail!("Sweeper failed to clean shutdown: {join_error:?}")
            }
            Ok(Err(error)) => Err(error).context("Sweeper failed with error"),
            Ok(Ok(())) => Ok(()),
        }
    }
}

fn sweeper_run(
    monitor: SharedMonitor,
    clock: WallClock,
    interval: Duration,
    stop: Arc<Stop>,
) -> Result<()> {
    // sleep in short slices so shutdown does not wait out a whole
    // interval
    const SLICE: Duration = Duration::from_millis(10);

    let mut last_sweep = Instant::now();

    while !stop.get() {
        if last_sweep.elapsed() >= interval {
            let reclaimed = monitor
                .sweep(clock.now())
                .context("A producing thread panicked while reporting")?;
            if reclaimed > 0 {
                debug!(reclaimed, "sweep reclaimed timed-out packets");
            }
            last_sweep = Instant::now();
        }

        std::thread::sleep(SLICE.min(interval));
    }

    // the final sweep: anything already past the timeout is accounted
    // before the caller exports its last report
    monitor
        .sweep(clock.now())
        .context("A producing thread panicked while reporting")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmon_core::{FlowMonitor, Headers, LossTimeout, PacketUid};
    use std::net::IpAddr;

    fn udp() -> Headers {
        let src: IpAddr = "10.0.0.1".parse().unwrap();
        let dst: IpAddr = "10.0.0.2".parse().unwrap();
        Headers::udp(src, 5000, dst, 9)
    }

    #[test]
    fn shutdown_is_clean_with_nothing_to_do() {
        let monitor = SharedMonitor::new();
        let sweeper = Sweeper::spawn(monitor, WallClock::start());

        sweeper.shutdown().unwrap();
    }

    #[test]
    fn reclaims_timed_out_packets() {
        let monitor = SharedMonitor::from_monitor(
            FlowMonitor::builder()
                .set_loss_timeout(LossTimeout::new(Duration::from_millis(20)))
                .set_log_anomalies(false)
                .build(),
        );
        let clock = WallClock::start();
        let sweeper = Sweeper::spawn_every(monitor.clone(), clock, Duration::from_millis(5));

        monitor
            .report_tx(PacketUid::new(1), udp(), 100, clock.now())
            .unwrap();

        // wait past the timeout plus a couple of sweep intervals
        std::thread::sleep(Duration::from_millis(60));

        let snapshot = monitor.snapshot().unwrap();
        assert_eq!(snapshot.flows[0].stats.timed_out_packets(), 1);
        assert_eq!(snapshot.in_flight, 0);

        sweeper.shutdown().unwrap();
    }

    #[test]
    fn shutdown_sweeps_one_last_time() {
        let monitor = SharedMonitor::from_monitor(
            FlowMonitor::builder()
                .set_loss_timeout(LossTimeout::new(Duration::from_millis(5)))
                .set_log_anomalies(false)
                .build(),
        );
        let clock = WallClock::start();
        // an interval far longer than the test: only the shutdown sweep
        // can reclaim the packet
        let sweeper = Sweeper::spawn_every(monitor.clone(), clock, Duration::from_secs(3600));

        monitor
            .report_tx(PacketUid::new(1), udp(), 100, clock.now())
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        sweeper.shutdown().unwrap();

        let snapshot = monitor.snapshot().unwrap();
        assert_eq!(snapshot.flows[0].stats.timed_out_packets(), 1);
    }
}

use crate::monitor::LossTimeout;
use std::time::Duration;

/// Default [`LossTimeout`]
///
/// This is the default value used by the [`FlowMonitor`] loss reclaimer:
/// an in-flight packet unresolved for longer than this (in simulated time)
/// is retired as lost on the next sweep.
///
/// ```
/// # use flowmon_core::defaults::*;
/// assert_eq!(
///     DEFAULT_LOSS_TIMEOUT.to_string(),
///     "10s"
/// );
/// ```
///
/// [`FlowMonitor`]: crate::FlowMonitor
pub const DEFAULT_LOSS_TIMEOUT: LossTimeout = LossTimeout::new(Duration::from_secs(10));

/// Default sweep cadence
///
/// How often the background sweeper of the `flowmon` wrapper crate calls
/// [`FlowMonitor::sweep`]. The core engine itself never sweeps on its own:
/// it only sweeps when told to, so single-threaded hosts keep full control
/// of the timeline.
///
/// ```
/// # use flowmon_core::defaults::*;
/// # use std::time::Duration;
/// assert_eq!(
///     DEFAULT_SWEEP_INTERVAL,
///     Duration::from_secs(1)
/// );
/// ```
///
/// [`FlowMonitor::sweep`]: crate::FlowMonitor::sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default anomaly-logging flag
///
/// When set, the [`FlowMonitor`] emits a `tracing` warning for every
/// absorbed anomaly (rx/drop of an unknown uid, uid collision). The
/// counters in [`Anomalies`] are maintained either way.
///
/// [`FlowMonitor`]: crate::FlowMonitor
/// [`Anomalies`]: crate::Anomalies
pub const DEFAULT_LOG_ANOMALIES: bool = true;

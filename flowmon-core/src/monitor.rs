use crate::{
    correlation::CorrelationStore,
    defaults::{DEFAULT_LOG_ANOMALIES, DEFAULT_LOSS_TIMEOUT},
    event::{DropReason, PacketEvent, PacketUid},
    flow::{FlowId, FlowKey, Headers},
    report::{ExportError, FlowSnapshot, MonitorSnapshot},
    stats::{FlowStats, LossKind, StatsTable},
    time::{DurationParseError, SimTime},
};
use std::{fmt, io, str::FromStr, time::Duration};
use tracing::{debug, warn};

/// How long a packet may stay in flight (in simulated time) before the
/// loss reclaimer retires it as lost.
///
/// # Default [`LossTimeout`]
///
/// ```
/// # use flowmon_core::LossTimeout;
/// assert_eq!(
///     LossTimeout::default().to_string(),
///     "10s"
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LossTimeout(u64);

impl LossTimeout {
    /// create a new timeout with the given [`Duration`].
    ///
    /// # truncation
    ///
    /// The timeout is precise up to the microsecond. Constructing a
    /// [`LossTimeout`] from a [`Duration`] holding nanosecond precision
    /// truncates the nanosecond part.
    #[inline(always)]
    pub const fn new(duration: Duration) -> Self {
        Self(duration.as_micros() as u64)
    }

    /// get the inner duration
    #[inline(always)]
    pub fn into_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl From<LossTimeout> for Duration {
    fn from(value: LossTimeout) -> Self {
        value.into_duration()
    }
}
impl From<Duration> for LossTimeout {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl Default for LossTimeout {
    fn default() -> Self {
        DEFAULT_LOSS_TIMEOUT
    }
}

impl fmt::Display for LossTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dur = crate::time::Duration::new(self.into_duration());
        dur.fmt(f)
    }
}

impl FromStr for LossTimeout {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = crate::time::Duration::from_str(s)?;

        Ok(Self::new(duration.into_duration()))
    }
}

/// Counters for the events the monitor absorbed without touching any
/// flow record.
///
/// None of these is fatal: the monitor counts them, optionally logs
/// them, and keeps going. They are part of every [`MonitorSnapshot`]
/// so reports can surface producer misbehaviour next to the flow
/// metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anomalies {
    /// rx events whose uid had no in-flight record
    pub unknown_rx: u64,
    /// drop events whose uid had no in-flight record
    pub unknown_drop: u64,
    /// tx events that reused a uid still in flight
    pub uid_collisions: u64,
}

impl Anomalies {
    /// sum of all the anomaly counters
    pub fn total(&self) -> u64 {
        self.unknown_rx + self.unknown_drop + self.uid_collisions
    }
}

/// Builder for configuring a [`FlowMonitor`].
///
/// Obtained via [`FlowMonitor::builder`]. Every setting has a default
/// (see [`defaults`]), so `FlowMonitor::builder().build()` is the same
/// as [`FlowMonitor::new`].
///
/// # Example
///
/// ```
/// use flowmon_core::{FlowMonitor, LossTimeout};
/// use std::time::Duration;
///
/// let monitor = FlowMonitor::builder()
///     .set_loss_timeout(LossTimeout::new(Duration::from_secs(30)))
///     .set_log_anomalies(false)
///     .build();
///
/// assert_eq!(monitor.loss_timeout().to_string(), "30s");
/// ```
///
/// [`defaults`]: crate::defaults
pub struct FlowMonitorBuilder {
    loss_timeout: LossTimeout,
    log_anomalies: bool,
}

impl FlowMonitorBuilder {
    pub fn new() -> Self {
        Self {
            loss_timeout: DEFAULT_LOSS_TIMEOUT,
            log_anomalies: DEFAULT_LOG_ANOMALIES,
        }
    }

    /// Set how long a packet may stay unresolved (in simulated time)
    /// before [`FlowMonitor::sweep`] retires it as lost.
    pub fn set_loss_timeout(mut self, timeout: LossTimeout) -> Self {
        self.loss_timeout = timeout;
        self
    }

    /// Enable or disable the `tracing` warnings emitted when the monitor
    /// absorbs an anomaly. The [`Anomalies`] counters are maintained
    /// either way.
    pub fn set_log_anomalies(mut self, log_anomalies: bool) -> Self {
        self.log_anomalies = log_anomalies;
        self
    }

    /// Finalise the configuration and build the monitor.
    pub fn build(self) -> FlowMonitor {
        let Self {
            loss_timeout,
            log_anomalies,
        } = self;

        FlowMonitor {
            store: CorrelationStore::new(),
            table: StatsTable::new(),
            anomalies: Anomalies::default(),
            loss_timeout,
            log_anomalies,
        }
    }
}

impl Default for FlowMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The flow monitor: a passive observer of packet lifecycle events that
/// maintains per-flow delivery statistics.
///
/// Producers feed it the three lifecycle events of each packet —
/// transmitted ([`report_tx`]), delivered ([`report_rx`]) or discarded
/// ([`report_drop`]) — with the timestamps of their own timeline. The
/// monitor correlates them by uid, classifies packets into flows and
/// keeps one [`FlowStats`] record per flow. Reports are pulled at any
/// time with [`snapshot`] or the export methods; nothing is ever pushed
/// out and ingest never fails.
///
/// The monitor is a plain value: instantiate it, hand `&mut` to whatever
/// produces events, query it from the reporting layer. There are no
/// globals and no hidden output streams. Multi-threaded hosts wrap it in
/// the single mutex the `flowmon` crate provides.
///
/// # Example
///
/// ```
/// use flowmon_core::{FlowMonitor, Headers, PacketUid, SimTime};
/// use std::net::IpAddr;
/// use std::time::Duration;
///
/// let mut monitor = FlowMonitor::new();
///
/// let src: IpAddr = "10.0.0.1".parse().unwrap();
/// let dst: IpAddr = "10.0.0.2".parse().unwrap();
/// let headers = Headers::udp(src, 49152, dst, 9);
///
/// // one packet delivered after 200ms...
/// monitor.report_tx(PacketUid::new(1), headers, 100, SimTime::from_secs(1));
/// monitor.report_rx(PacketUid::new(1), SimTime::from_millis(1_200));
///
/// // ...and one that never arrives: the sweep retires it after the
/// // loss timeout (10s by default)
/// monitor.report_tx(PacketUid::new(2), headers, 100, SimTime::from_secs(2));
/// monitor.sweep(SimTime::from_secs(13));
///
/// let snapshot = monitor.snapshot();
/// let mut report = Vec::new();
/// snapshot.export_text(&mut report).unwrap();
///
/// assert_eq!(
///     String::from_utf8(report).unwrap(),
///     "1 10.0.0.1:49152 -> 10.0.0.2:9 \
///      TxPackets=2 RxPackets=1 LostPackets=1 PDR=0.5000 \
///      MeanDelaySec=0.200000 MeanJitterSec=0.000000 ThroughputBps=0.000\n",
/// );
/// ```
///
/// [`report_tx`]: FlowMonitor::report_tx
/// [`report_rx`]: FlowMonitor::report_rx
/// [`report_drop`]: FlowMonitor::report_drop
/// [`snapshot`]: FlowMonitor::snapshot
pub struct FlowMonitor {
    store: CorrelationStore,
    table: StatsTable,
    anomalies: Anomalies,
    loss_timeout: LossTimeout,
    log_anomalies: bool,
}

impl FlowMonitor {
    /// Create a monitor with the default configuration
    /// (see [`defaults`](crate::defaults)).
    pub fn new() -> Self {
        FlowMonitorBuilder::new().build()
    }

    /// Start configuring a monitor.
    pub fn builder() -> FlowMonitorBuilder {
        FlowMonitorBuilder::new()
    }

    /// the configured loss timeout
    pub fn loss_timeout(&self) -> LossTimeout {
        self.loss_timeout
    }

    // ---- ingest ----

    /// A packet entered the network.
    ///
    /// Classifies the headers, interns the flow on first sight and starts
    /// tracking the packet. Returns the id of the flow the packet was
    /// classified into.
    ///
    /// Reusing a uid that is still in flight is a collision: the stale
    /// packet is retired as lost ([`LossKind::Superseded`]), the
    /// collision counter goes up, and the new packet takes the uid over.
    pub fn report_tx(
        &mut self,
        uid: PacketUid,
        headers: Headers,
        size: u64,
        at: SimTime,
    ) -> FlowId {
        let flow = self.table.intern(headers.classify());

        if let Some(stale) = self.store.insert(uid, flow, size, at) {
            self.anomalies.uid_collisions += 1;
            if self.log_anomalies {
                warn!(
                    %uid,
                    flow = %stale.flow,
                    sent_at = %stale.sent_at,
                    "uid reused while still in flight, retiring the previous packet as lost",
                );
            }
            self.table.on_lost(stale.flow, LossKind::Superseded);
        }

        self.table.on_tx(flow, size, at);

        flow
    }

    /// A packet reached its destination.
    ///
    /// Resolves the uid against the in-flight records and accounts the
    /// delivery (bytes, one-way delay, jitter) to the packet's flow. An
    /// unknown uid is counted in [`Anomalies::unknown_rx`] and otherwise
    /// ignored; it never touches any flow record.
    pub fn report_rx(&mut self, uid: PacketUid, at: SimTime) {
        match self.store.resolve_rx(uid, at) {
            Some(delivered) => {
                self.table
                    .on_delivered(delivered.flow, delivered.size, delivered.delay, delivered.at);
            }
            None => {
                self.anomalies.unknown_rx += 1;
                if self.log_anomalies {
                    warn!(%uid, %at, "rx for a uid that was never transmitted, ignored");
                }
            }
        }
    }

    /// A producer explicitly discarded a packet.
    ///
    /// Resolves the uid and accounts the loss to the packet's flow under
    /// the given reason. An unknown uid is counted in
    /// [`Anomalies::unknown_drop`] and otherwise ignored.
    pub fn report_drop(&mut self, uid: PacketUid, reason: DropReason, at: SimTime) {
        match self.store.resolve_drop(uid) {
            Some(record) => {
                self.table.on_lost(record.flow, LossKind::Dropped(reason));
            }
            None => {
                self.anomalies.unknown_drop += 1;
                if self.log_anomalies {
                    warn!(%uid, %reason, %at, "drop for a uid that was never transmitted, ignored");
                }
            }
        }
    }

    /// Record one normalized [`PacketEvent`].
    ///
    /// Exactly equivalent to calling the matching typed report method.
    pub fn record(&mut self, event: PacketEvent) {
        match event {
            PacketEvent::Tx {
                uid,
                headers,
                size,
                at,
            } => {
                self.report_tx(uid, headers, size, at);
            }
            PacketEvent::Rx { uid, at } => self.report_rx(uid, at),
            PacketEvent::Drop { uid, reason, at } => self.report_drop(uid, reason, at),
        }
    }

    /// Retire every packet that has been in flight for the loss timeout
    /// or longer at `now`, counting each as lost ([`LossKind::TimedOut`])
    /// on its flow.
    ///
    /// The host calls this at whatever cadence suits it; call it once
    /// more before exporting a report so packets that will never resolve
    /// are accounted for. Idempotent, safe with nothing in flight, and
    /// time-driven only: nothing else in the monitor ever retires a
    /// packet by age. Returns how many packets were retired.
    pub fn sweep(&mut self, now: SimTime) -> usize {
        let evicted = self.store.sweep(now, self.loss_timeout.into_duration());
        let count = evicted.len();

        for record in evicted {
            debug!(
                flow = %record.flow,
                sent_at = %record.sent_at,
                %now,
                "in-flight packet timed out, retired as lost",
            );
            self.table.on_lost(record.flow, LossKind::TimedOut);
        }

        count
    }

    // ---- queries ----

    /// how many flows have been observed so far
    pub fn flows(&self) -> usize {
        self.table.len()
    }

    /// how many packets are currently in flight, all flows included
    pub fn in_flight(&self) -> usize {
        self.store.len()
    }

    /// how many packets of `flow` are currently in flight
    pub fn in_flight_of(&self, flow: FlowId) -> u64 {
        self.store.count_of(flow)
    }

    /// the id under which `key` was interned, if it was ever seen
    pub fn id_of(&self, key: &FlowKey) -> Option<FlowId> {
        self.table.id_of(key)
    }

    /// the five-tuple behind a flow id
    pub fn find_flow(&self, id: FlowId) -> Option<&FlowKey> {
        self.table.key_of(id)
    }

    /// the live record of a flow
    ///
    /// Cheaper than [`snapshot`](FlowMonitor::snapshot) when only one
    /// flow is of interest. The reference borrows the monitor; clone the
    /// record to keep it across further events.
    pub fn stats_of(&self, id: FlowId) -> Option<&FlowStats> {
        self.table.get(id)
    }

    /// the anomaly counters
    pub fn anomalies(&self) -> Anomalies {
        self.anomalies
    }

    /// Take a point-in-time copy of every flow record.
    ///
    /// The snapshot is detached: events recorded afterwards do not show
    /// up in it, and exporting it never touches the monitor. Flows come
    /// out in id order, so two snapshots of the same state are equal and
    /// export identically.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let flows = self
            .table
            .iter()
            .map(|(id, key, stats)| FlowSnapshot {
                id,
                key: *key,
                stats: stats.clone(),
            })
            .collect();

        MonitorSnapshot {
            flows,
            anomalies: self.anomalies,
            in_flight: self.store.len() as u64,
        }
    }

    /// Render the text report of the current state to `writer`.
    ///
    /// One line per flow, in flow id order; see
    /// [`MonitorSnapshot::export_text`] for the format.
    pub fn export_text<W: io::Write>(&self, writer: W) -> Result<(), ExportError> {
        self.snapshot().export_text(writer)
    }

    /// Render the structured (JSON) report of the current state to
    /// `writer`; see [`MonitorSnapshot::export_json`].
    pub fn export_json<W: io::Write>(&self, writer: W) -> Result<(), ExportError> {
        self.snapshot().export_json(writer)
    }

    /// Start a new reporting window.
    ///
    /// Every flow record and the anomaly counters are reset to zero;
    /// the flows keep their ids and packets currently in flight keep
    /// their tx timestamps — when they resolve, the delivery or loss is
    /// accounted to the new window.
    pub fn reset_stats(&mut self) {
        self.table.reset();
        self.anomalies = Anomalies::default();
    }
}

impl Default for FlowMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlowMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowMonitor")
            .field("flows", &self.table.len())
            .field("in_flight", &self.store.len())
            .field("anomalies", &self.anomalies)
            .field("loss_timeout", &self.loss_timeout)
            .finish_non_exhaustive()
    }
}

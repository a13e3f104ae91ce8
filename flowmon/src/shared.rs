use flowmon_core::{
    Anomalies, DropReason, ExportError, FlowId, FlowKey, FlowMonitor, FlowStats, Headers,
    LossTimeout, MonitorSnapshot, PacketEvent, PacketUid, SimTime,
};
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;

/// Error returned when the monitor mutex is poisoned.
///
/// A poisoned lock means a thread panicked while it held the monitor;
/// the counters may be mid-update, so the wrapper refuses to keep
/// going rather than report inconsistent numbers.
#[derive(Debug, Error)]
#[error("The flow monitor lock is poisoned: a thread panicked while reporting.")]
pub struct MonitorPoisoned;

/// Error returned by the shared export methods.
#[derive(Debug, Error)]
pub enum SharedExportError {
    #[error(transparent)]
    Poisoned(#[from] MonitorPoisoned),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// A [`FlowMonitor`] behind one mutex, for multi-threaded hosts.
///
/// The core engine is single-threaded by construction. When several
/// threads produce events (a live probe with one thread per capture
/// interface, say), they share a clone of this wrapper instead: every
/// ingest and query call locks the one mutex, so events stay atomic
/// with respect to each other exactly as they are in the
/// single-threaded deployment. Sharding by flow hash was considered
/// and rejected: it would break the cross-flow conservation queries
/// and no producer measured so far is ingest-bound.
///
/// All methods mirror the [`FlowMonitor`] surface, returning
/// [`MonitorPoisoned`] if a producing thread panicked mid-report.
///
/// # Example
///
/// ```
/// use flowmon::{SharedMonitor, Headers, PacketUid, SimTime};
/// use std::net::IpAddr;
///
/// let monitor = SharedMonitor::new();
/// let producer = monitor.clone();
///
/// let src: IpAddr = "10.0.0.1".parse().unwrap();
/// let dst: IpAddr = "10.0.0.2".parse().unwrap();
///
/// let handle = std::thread::spawn(move || {
///     let headers = Headers::udp(src, 49152, dst, 9);
///     producer.report_tx(PacketUid::new(1), headers, 100, SimTime::from_secs(1)).unwrap();
///     producer.report_rx(PacketUid::new(1), SimTime::from_millis(1_200)).unwrap();
/// });
/// handle.join().unwrap();
///
/// let snapshot = monitor.snapshot().unwrap();
/// assert_eq!(snapshot.flows.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SharedMonitor(Arc<Mutex<FlowMonitor>>);

impl SharedMonitor {
    /// Share a monitor with the default configuration.
    pub fn new() -> Self {
        Self::from_monitor(FlowMonitor::new())
    }

    /// Share an already configured monitor.
    pub fn from_monitor(monitor: FlowMonitor) -> Self {
        Self(Arc::new(Mutex::new(monitor)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, FlowMonitor>, MonitorPoisoned> {
        self.0.lock().map_err(|_| MonitorPoisoned)
    }

    // ---- ingest ----

    /// see [`FlowMonitor::report_tx`]
    pub fn report_tx(
        &self,
        uid: PacketUid,
        headers: Headers,
        size: u64,
        at: SimTime,
    ) -> Result<FlowId, MonitorPoisoned> {
        Ok(self.lock()?.report_tx(uid, headers, size, at))
    }

    /// see [`FlowMonitor::report_rx`]
    pub fn report_rx(&self, uid: PacketUid, at: SimTime) -> Result<(), MonitorPoisoned> {
        self.lock()?.report_rx(uid, at);
        Ok(())
    }

    /// see [`FlowMonitor::report_drop`]
    pub fn report_drop(
        &self,
        uid: PacketUid,
        reason: DropReason,
        at: SimTime,
    ) -> Result<(), MonitorPoisoned> {
        self.lock()?.report_drop(uid, reason, at);
        Ok(())
    }

    /// see [`FlowMonitor::record`]
    pub fn record(&self, event: PacketEvent) -> Result<(), MonitorPoisoned> {
        self.lock()?.record(event);
        Ok(())
    }

    /// see [`FlowMonitor::sweep`]
    pub fn sweep(&self, now: SimTime) -> Result<usize, MonitorPoisoned> {
        Ok(self.lock()?.sweep(now))
    }

    // ---- queries ----

    /// see [`FlowMonitor::snapshot`]
    pub fn snapshot(&self) -> Result<MonitorSnapshot, MonitorPoisoned> {
        Ok(self.lock()?.snapshot())
    }

    /// see [`FlowMonitor::anomalies`]
    pub fn anomalies(&self) -> Result<Anomalies, MonitorPoisoned> {
        Ok(self.lock()?.anomalies())
    }

    /// see [`FlowMonitor::flows`]
    pub fn flows(&self) -> Result<usize, MonitorPoisoned> {
        Ok(self.lock()?.flows())
    }

    /// see [`FlowMonitor::in_flight`]
    pub fn in_flight(&self) -> Result<usize, MonitorPoisoned> {
        Ok(self.lock()?.in_flight())
    }

    /// see [`FlowMonitor::in_flight_of`]
    pub fn in_flight_of(&self, flow: FlowId) -> Result<u64, MonitorPoisoned> {
        Ok(self.lock()?.in_flight_of(flow))
    }

    /// A copy of one flow's live record; see [`FlowMonitor::stats_of`].
    pub fn stats_of(&self, id: FlowId) -> Result<Option<FlowStats>, MonitorPoisoned> {
        Ok(self.lock()?.stats_of(id).cloned())
    }

    /// see [`FlowMonitor::find_flow`]
    pub fn find_flow(&self, id: FlowId) -> Result<Option<FlowKey>, MonitorPoisoned> {
        Ok(self.lock()?.find_flow(id).copied())
    }

    /// see [`FlowMonitor::loss_timeout`]
    pub fn loss_timeout(&self) -> Result<LossTimeout, MonitorPoisoned> {
        Ok(self.lock()?.loss_timeout())
    }

    /// Render the text report of the current state; the lock is held
    /// only while the snapshot is taken, not while it is written out.
    pub fn export_text<W: io::Write>(&self, writer: W) -> Result<(), SharedExportError> {
        let snapshot = self.snapshot()?;
        snapshot.export_text(writer)?;
        Ok(())
    }

    /// Render the structured (JSON) report of the current state; same
    /// locking discipline as [`export_text`](SharedMonitor::export_text).
    pub fn export_json<W: io::Write>(&self, writer: W) -> Result<(), SharedExportError> {
        let snapshot = self.snapshot()?;
        snapshot.export_json(writer)?;
        Ok(())
    }

    /// see [`FlowMonitor::reset_stats`]
    pub fn reset_stats(&self) -> Result<(), MonitorPoisoned> {
        self.lock()?.reset_stats();
        Ok(())
    }
}

impl Default for SharedMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl From<FlowMonitor> for SharedMonitor {
    fn from(monitor: FlowMonitor) -> Self {
        Self::from_monitor(monitor)
    }
}

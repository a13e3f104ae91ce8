/*!
# Flow monitor

A passive flow classification and performance-measurement engine for
packet-level simulators and live probes.

Producers report the lifecycle events of each packet (transmitted,
delivered, dropped) to a [`FlowMonitor`] together with timestamps from
their own timeline. The monitor classifies packets into flows by the
classic five-tuple, correlates every transmission with its eventual
reception or loss, and maintains one statistics record per flow:
delivery ratio, mean one-way delay, mean jitter, throughput and a
breakdown of the loss paths. Reports are pulled at any time, as a
detached [`MonitorSnapshot`] or rendered as text or JSON.

This crate is single-threaded by construction; the `flowmon` crate
wraps it for multi-threaded hosts and live probes.
*/

pub mod defaults;

mod correlation;
mod event;
mod flow;
mod monitor;
mod report;
mod stats;
mod time;

pub use self::{
    event::{DropReason, PacketEvent, PacketUid, PacketUidGenerator},
    flow::{FlowId, FlowKey, Headers, Protocol, ProtocolParseError},
    monitor::{Anomalies, FlowMonitor, FlowMonitorBuilder, LossTimeout},
    report::{ExportError, FlowSnapshot, MonitorSnapshot},
    stats::{FlowStats, LossKind},
    time::{DurationParseError, SimTime},
};

/*!
# Flow monitor for multi-threaded hosts

Wraps the single-threaded [`flowmon_core`] engine for deployments where
events come from more than one thread: a [`SharedMonitor`] puts the
monitor behind one mutex, a [`WallClock`] anchors live-probe timestamps
to the monitor's timeline, and a [`Sweeper`] reclaims lost packets in
the background when no simulator is driving the sweeps.

Simulators embedding the engine in their own event loop should depend
on `flowmon-core` directly.
*/

mod clock;
mod shared;
mod stop;
mod sweeper;

// convenient re-export of `flowmon_core` core objects
pub use flowmon_core::{
    defaults, Anomalies, DropReason, ExportError, FlowId, FlowKey, FlowMonitor,
    FlowMonitorBuilder, FlowSnapshot, FlowStats, Headers, LossKind, LossTimeout, MonitorSnapshot,
    PacketEvent, PacketUid, PacketUidGenerator, Protocol, SimTime,
};

pub use self::{
    clock::WallClock,
    shared::{MonitorPoisoned, SharedExportError, SharedMonitor},
    sweeper::Sweeper,
};

use crate::{flow::Headers, time::SimTime};
use std::{
    fmt,
    sync::{Arc, atomic::AtomicU64},
};

/// a generator for monotonically increasing **unique** [`PacketUid`]
///
/// For producers that do not already stamp their packets with an
/// identifier. Producers that do (most simulators tag packets at creation)
/// should feed their own values through [`PacketUid::new`] instead; the
/// monitor only ever compares uids for equality.
#[derive(Debug, Clone, Default)]
pub struct PacketUidGenerator(Arc<AtomicU64>);

/// # Packet unique identifier
///
/// Assigned once when the packet is created and carried by every lifecycle
/// event of that packet, so the monitor can pair a transmission with its
/// eventual reception or loss. A uid must not be reused while the previous
/// packet wearing it is still in flight; the monitor treats such reuse as
/// a collision and retires the older packet as lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketUid(u64);

impl PacketUidGenerator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    /// generate a new unique identifier
    pub fn generate(&self) -> PacketUid {
        let id = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        debug_assert!(
            id != 0,
            "The only case this can be equal to 0 is if the generator overflowed. If this \
            happens it means we have generated `u64::MAX` unique packet identifiers and we \
            wrapped around on overflow. This shouldn't happen!"
        );

        PacketUid(id)
    }
}

impl PacketUid {
    /// wrap a producer-assigned identifier
    pub const fn new(uid: u64) -> Self {
        Self(uid)
    }

    /// a _NULL_ packet identifier (i.e. doesn't have a packet to it)
    #[cfg(test)]
    pub(crate) const NULL: Self = Self(0);
}

impl fmt::Display for PacketUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Why a producer reported a packet as dropped.
///
/// The set is closed on purpose. Producers whose stack distinguishes more
/// reasons than these fold the remainder into [`DropReason::Other`]; the
/// per-flow breakdown in the report keeps every reason separate from
/// timeout evictions, which are not drops at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// a queue or buffer along the path was full
    QueueOverflow,
    /// no route towards the destination
    NoRoute,
    /// the packet's time-to-live expired
    TtlExpired,
    /// the packet failed an integrity check on reception
    Corrupted,
    /// a link's loss policy discarded the packet
    LossPolicy,
    /// any reason the producer does not map onto the above
    Other,
}

impl DropReason {
    pub(crate) const COUNT: usize = 6;

    /// every reason, in report order
    pub const ALL: [Self; Self::COUNT] = [
        DropReason::QueueOverflow,
        DropReason::NoRoute,
        DropReason::TtlExpired,
        DropReason::Corrupted,
        DropReason::LossPolicy,
        DropReason::Other,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            DropReason::QueueOverflow => 0,
            DropReason::NoRoute => 1,
            DropReason::TtlExpired => 2,
            DropReason::Corrupted => 3,
            DropReason::LossPolicy => 4,
            DropReason::Other => 5,
        }
    }

    /// stable identifier, used as the key in structured reports
    pub const fn as_str(self) -> &'static str {
        match self {
            DropReason::QueueOverflow => "queue_overflow",
            DropReason::NoRoute => "no_route",
            DropReason::TtlExpired => "ttl_expired",
            DropReason::Corrupted => "corrupted",
            DropReason::LossPolicy => "loss_policy",
            DropReason::Other => "other",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized packet lifecycle event.
///
/// Heterogeneous probe outputs all funnel into this one type;
/// [`FlowMonitor::record`] dispatches on it. The typed report methods
/// ([`report_tx`], [`report_rx`], [`report_drop`]) are equivalent and
/// skip building the enum.
///
/// Events are transient: the monitor consumes them and owns nothing of
/// them afterwards.
///
/// [`FlowMonitor::record`]: crate::FlowMonitor::record
/// [`report_tx`]: crate::FlowMonitor::report_tx
/// [`report_rx`]: crate::FlowMonitor::report_rx
/// [`report_drop`]: crate::FlowMonitor::report_drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketEvent {
    /// the packet entered the network
    Tx {
        uid: PacketUid,
        headers: Headers,
        size: u64,
        at: SimTime,
    },
    /// the packet reached its destination
    Rx { uid: PacketUid, at: SimTime },
    /// a producer explicitly reported the packet discarded
    Drop {
        uid: PacketUid,
        reason: DropReason,
        at: SimTime,
    },
}

impl PacketEvent {
    /// the uid the event is about
    pub fn uid(&self) -> PacketUid {
        match self {
            PacketEvent::Tx { uid, .. }
            | PacketEvent::Rx { uid, .. }
            | PacketEvent::Drop { uid, .. } => *uid,
        }
    }

    /// when the event happened on the simulated timeline
    pub fn at(&self) -> SimTime {
        match self {
            PacketEvent::Tx { at, .. }
            | PacketEvent::Rx { at, .. }
            | PacketEvent::Drop { at, .. } => *at,
        }
    }
}

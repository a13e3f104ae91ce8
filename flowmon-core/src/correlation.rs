//! Pairing each transmitted packet with its eventual reception or loss.
//!
//! The store holds one record per packet whose fate is still unknown,
//! keyed by uid. Records enter on tx and leave exactly once: on a
//! matching rx, on an explicit drop, on a timeout sweep, or evicted by a
//! colliding tx reusing their uid. Memory is therefore bounded by the
//! number of concurrently unresolved packets, never by total traffic.

use crate::{event::PacketUid, flow::FlowId, time::SimTime};
use std::{collections::HashMap, time::Duration};

/// a transmitted packet whose fate is still unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub(crate) flow: FlowId,
    pub(crate) size: u64,
    pub(crate) sent_at: SimTime,
}

/// a packet that made it, with the measured one-way delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivered {
    pub(crate) flow: FlowId,
    pub(crate) size: u64,
    pub(crate) delay: Duration,
    pub(crate) at: SimTime,
}

#[derive(Debug, Default)]
pub(crate) struct CorrelationStore {
    in_flight: HashMap<PacketUid, InFlight>,
}

impl CorrelationStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Track a freshly transmitted packet.
    ///
    /// Returns the stale record when `uid` was already in flight: that is
    /// a uid collision, and the caller retires the stale packet as lost
    /// before accounting for the new one.
    pub(crate) fn insert(
        &mut self,
        uid: PacketUid,
        flow: FlowId,
        size: u64,
        sent_at: SimTime,
    ) -> Option<InFlight> {
        self.in_flight.insert(
            uid,
            InFlight {
                flow,
                size,
                sent_at,
            },
        )
    }

    /// Resolve a uid on reception.
    ///
    /// The record is removed and returned with
    /// `delay = at - sent_at` (saturating to zero: the store does not
    /// trust producers to always honour the tx ≤ rx ordering). `None`
    /// when the uid was never seen as tx.
    pub(crate) fn resolve_rx(&mut self, uid: PacketUid, at: SimTime) -> Option<Delivered> {
        let InFlight {
            flow,
            size,
            sent_at,
        } = self.in_flight.remove(&uid)?;

        Some(Delivered {
            flow,
            size,
            delay: at.saturating_duration_since(sent_at),
            at,
        })
    }

    /// Resolve a uid on an explicit drop. `None` when the uid was never
    /// seen as tx.
    pub(crate) fn resolve_drop(&mut self, uid: PacketUid) -> Option<InFlight> {
        self.in_flight.remove(&uid)
    }

    /// Evict every record that has been in flight for `timeout` or longer
    /// at `now`, returning them in uid order.
    ///
    /// The uid ordering keeps downstream accounting and logging
    /// deterministic regardless of hash-map iteration order. Idempotent:
    /// a second sweep at the same `now` evicts nothing.
    pub(crate) fn sweep(&mut self, now: SimTime, timeout: Duration) -> Vec<InFlight> {
        let mut expired: Vec<PacketUid> = self
            .in_flight
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.sent_at) >= timeout)
            .map(|(uid, _)| *uid)
            .collect();
        expired.sort_unstable();

        expired
            .into_iter()
            .filter_map(|uid| self.in_flight.remove(&uid))
            .collect()
    }

    /// how many packets are currently in flight, all flows included
    pub(crate) fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// how many packets of `flow` are currently in flight
    ///
    /// Linear over the in-flight records, which are bounded by the
    /// producer's concurrency.
    pub(crate) fn count_of(&self, flow: FlowId) -> u64 {
        self.in_flight
            .values()
            .filter(|record| record.flow == flow)
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: FlowId = FlowId::ONE;

    fn store_with(uids: &[u64], sent_at: SimTime) -> CorrelationStore {
        let mut store = CorrelationStore::new();
        for uid in uids {
            assert!(store.insert(PacketUid::new(*uid), FLOW, 100, sent_at).is_none());
        }
        store
    }

    #[test]
    fn rx_resolves_with_delay() {
        let mut store = store_with(&[1], SimTime::from_secs(1));

        let delivered = store
            .resolve_rx(PacketUid::new(1), SimTime::from_millis(1_200))
            .unwrap();

        assert_eq!(delivered.flow, FLOW);
        assert_eq!(delivered.size, 100);
        assert_eq!(delivered.delay, Duration::from_millis(200));
        assert_eq!(delivered.at, SimTime::from_millis(1_200));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn rx_before_tx_timestamp_saturates() {
        let mut store = store_with(&[1], SimTime::from_secs(2));

        let delivered = store
            .resolve_rx(PacketUid::new(1), SimTime::from_secs(1))
            .unwrap();

        assert_eq!(delivered.delay, Duration::ZERO);
    }

    #[test]
    fn unknown_uid_is_not_resolved() {
        let mut store = store_with(&[1], SimTime::ZERO);

        assert!(store.resolve_rx(PacketUid::new(2), SimTime::ZERO).is_none());
        assert!(store.resolve_drop(PacketUid::new(2)).is_none());
        // the known record is untouched
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resolution_is_terminal() {
        let mut store = store_with(&[1], SimTime::ZERO);

        assert!(store.resolve_rx(PacketUid::new(1), SimTime::ZERO).is_some());
        // a second rx for the same uid finds nothing
        assert!(store.resolve_rx(PacketUid::new(1), SimTime::ZERO).is_none());
    }

    #[test]
    fn collision_returns_the_stale_record() {
        let mut store = CorrelationStore::new();

        assert!(
            store
                .insert(PacketUid::new(1), FLOW, 100, SimTime::from_secs(1))
                .is_none()
        );
        let stale = store
            .insert(PacketUid::new(1), FLOW, 200, SimTime::from_secs(2))
            .unwrap();

        assert_eq!(stale.size, 100);
        assert_eq!(stale.sent_at, SimTime::from_secs(1));

        // the new record replaced it
        assert_eq!(store.len(), 1);
        let delivered = store
            .resolve_rx(PacketUid::new(1), SimTime::from_secs(3))
            .unwrap();
        assert_eq!(delivered.size, 200);
        assert_eq!(delivered.delay, Duration::from_secs(1));
    }

    #[test]
    fn sweep_evicts_only_expired_records() {
        let mut store = CorrelationStore::new();
        store.insert(PacketUid::new(1), FLOW, 100, SimTime::from_secs(2));
        store.insert(PacketUid::new(2), FLOW, 100, SimTime::from_secs(11));

        let evicted = store.sweep(SimTime::from_secs(12), Duration::from_secs(10));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].sent_at, SimTime::from_secs(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_boundary_is_inclusive() {
        let mut store = store_with(&[1], SimTime::from_secs(2));

        // age is exactly the timeout: evicted
        let evicted = store.sweep(SimTime::from_secs(12), Duration::from_secs(10));

        assert_eq!(evicted.len(), 1);
    }

    #[test]
    fn sweep_is_idempotent_and_safe_when_empty() {
        let mut store = store_with(&[1, 2, 3], SimTime::ZERO);

        let first = store.sweep(SimTime::from_secs(60), Duration::from_secs(10));
        let second = store.sweep(SimTime::from_secs(60), Duration::from_secs(10));

        assert_eq!(first.len(), 3);
        assert!(second.is_empty());
        assert!(CorrelationStore::new()
            .sweep(SimTime::from_secs(60), Duration::from_secs(10))
            .is_empty());
    }

    #[test]
    fn sweep_returns_uid_order() {
        let mut store = CorrelationStore::new();
        // insertion order scrambled on purpose
        for uid in [5u64, 1, 4, 2, 3] {
            store.insert(PacketUid::new(uid), FLOW, uid, SimTime::ZERO);
        }

        let evicted = store.sweep(SimTime::from_secs(60), Duration::from_secs(10));
        let sizes: Vec<u64> = evicted.iter().map(|record| record.size).collect();

        // size was set to the uid above, so this checks the eviction order
        assert_eq!(sizes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn count_of_filters_by_flow() {
        let mut store = CorrelationStore::new();
        let other = FlowId::ONE.next();

        store.insert(PacketUid::new(1), FLOW, 100, SimTime::ZERO);
        store.insert(PacketUid::new(2), FLOW, 100, SimTime::ZERO);
        store.insert(PacketUid::new(3), other, 100, SimTime::ZERO);

        assert_eq!(store.count_of(FLOW), 2);
        assert_eq!(store.count_of(other), 1);
        assert_eq!(store.len(), 3);
    }
}

//! Per-flow statistics: the record every resolved event lands in.
//!
//! [`FlowStats`] is the incrementally maintained record of one flow.
//! Counters are updated in constant time on every event; the derived
//! metrics (delivery ratio, mean delay, mean jitter, throughput) are
//! recomputed on access so they are never stale and never divide by zero.

use crate::{
    event::DropReason,
    flow::{FlowId, FlowKey},
    time::SimTime,
};
use std::{collections::HashMap, time::Duration};

/// How a packet came to be counted as lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// a producer reported an explicit drop
    Dropped(DropReason),
    /// the loss reclaimer evicted the packet after the timeout
    TimedOut,
    /// a colliding tx reused the packet's uid while it was in flight
    Superseded,
}

/// Incrementally maintained counters for one flow.
///
/// The three loss paths stay distinguishable: [`dropped_packets`] counts
/// explicit drops (with a per-[`DropReason`] breakdown),
/// [`timed_out_packets`] counts sweep evictions and
/// [`superseded_packets`] counts uid-collision evictions. All three are
/// included in [`lost_packets`].
///
/// The conservation law ties the record to the in-flight store: at any
/// point, `tx_packets == rx_packets + lost_packets + in-flight`.
///
/// [`dropped_packets`]: FlowStats::dropped_packets
/// [`timed_out_packets`]: FlowStats::timed_out_packets
/// [`superseded_packets`]: FlowStats::superseded_packets
/// [`lost_packets`]: FlowStats::lost_packets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowStats {
    tx_packets: u64,
    rx_packets: u64,
    lost_packets: u64,
    dropped_packets: u64,
    timed_out_packets: u64,
    superseded_packets: u64,
    drops: [u64; DropReason::COUNT],
    tx_bytes: u64,
    rx_bytes: u64,
    delay_sum: Duration,
    jitter_sum: Duration,
    last_delay: Option<Duration>,
    first_tx: Option<SimTime>,
    last_tx: Option<SimTime>,
    first_rx: Option<SimTime>,
    last_rx: Option<SimTime>,
}

impl FlowStats {
    pub(crate) fn on_tx(&mut self, size: u64, at: SimTime) {
        self.tx_packets += 1;
        self.tx_bytes += size;
        if self.first_tx.is_none() {
            self.first_tx = Some(at);
        }
        self.last_tx = Some(self.last_tx.map_or(at, |last| last.max(at)));
    }

    pub(crate) fn on_delivered(&mut self, size: u64, delay: Duration, at: SimTime) {
        self.rx_packets += 1;
        self.rx_bytes += size;
        self.delay_sum += delay;
        // RFC 3393 style: accumulate the absolute delay variation, but
        // only once a previous delay sample exists for this flow
        if let Some(last) = self.last_delay {
            self.jitter_sum += last.abs_diff(delay);
        }
        self.last_delay = Some(delay);
        if self.first_rx.is_none() {
            self.first_rx = Some(at);
        }
        self.last_rx = Some(self.last_rx.map_or(at, |last| last.max(at)));
    }

    pub(crate) fn on_lost(&mut self, kind: LossKind) {
        self.lost_packets += 1;
        match kind {
            LossKind::Dropped(reason) => {
                self.dropped_packets += 1;
                self.drops[reason.index()] += 1;
            }
            LossKind::TimedOut => self.timed_out_packets += 1,
            LossKind::Superseded => self.superseded_packets += 1,
        }
    }

    /// packets transmitted on this flow
    pub fn tx_packets(&self) -> u64 {
        self.tx_packets
    }

    /// packets delivered on this flow
    pub fn rx_packets(&self) -> u64 {
        self.rx_packets
    }

    /// packets lost on this flow, all loss paths included
    pub fn lost_packets(&self) -> u64 {
        self.lost_packets
    }

    /// packets lost to an explicit drop report
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    /// packets lost to a loss-reclaimer timeout eviction
    pub fn timed_out_packets(&self) -> u64 {
        self.timed_out_packets
    }

    /// packets lost because a later tx reused their uid
    pub fn superseded_packets(&self) -> u64 {
        self.superseded_packets
    }

    /// explicit drops of the given reason
    pub fn drops_of(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()]
    }

    /// bytes transmitted on this flow
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    /// bytes delivered on this flow
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    /// sum of the one-way delays of every delivered packet
    pub fn delay_sum(&self) -> Duration {
        self.delay_sum
    }

    /// sum of the absolute delay variations between consecutive deliveries
    pub fn jitter_sum(&self) -> Duration {
        self.jitter_sum
    }

    /// when the first packet of this flow was transmitted
    pub fn first_tx(&self) -> Option<SimTime> {
        self.first_tx
    }

    /// when the latest packet of this flow was transmitted
    pub fn last_tx(&self) -> Option<SimTime> {
        self.last_tx
    }

    /// when the first packet of this flow was delivered
    pub fn first_rx(&self) -> Option<SimTime> {
        self.first_rx
    }

    /// when the latest packet of this flow was delivered
    pub fn last_rx(&self) -> Option<SimTime> {
        self.last_rx
    }

    /// packets of this flow still in flight, derived from the counters
    /// through the conservation law
    pub fn in_flight(&self) -> u64 {
        self.tx_packets
            .saturating_sub(self.rx_packets)
            .saturating_sub(self.lost_packets)
    }

    // ---- derived metrics, recomputed on every call ----

    /// Packet delivery ratio: `rx_packets / tx_packets`.
    ///
    /// `0.0` when nothing was transmitted; always within `0.0..=1.0`.
    pub fn pdr(&self) -> f64 {
        if self.tx_packets == 0 {
            return 0.0;
        }
        self.rx_packets as f64 / self.tx_packets as f64
    }

    /// Mean one-way delay of the delivered packets.
    ///
    /// Zero when nothing was delivered.
    pub fn mean_delay(&self) -> Duration {
        if self.rx_packets == 0 {
            return Duration::ZERO;
        }
        let nanos = self.delay_sum.as_nanos() / u128::from(self.rx_packets);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Mean delay variation between consecutive deliveries:
    /// `jitter_sum / max(rx_packets - 1, 1)`.
    ///
    /// Zero until two packets have been delivered.
    pub fn mean_jitter(&self) -> Duration {
        let samples = self.rx_packets.saturating_sub(1).max(1);
        let nanos = self.jitter_sum.as_nanos() / u128::from(samples);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Delivered throughput in bits per second, measured over the
    /// reception window (first to last delivered packet).
    ///
    /// `0.0` when the window is empty or has zero width; never a division
    /// by zero, never NaN.
    pub fn throughput_bps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.first_rx, self.last_rx) else {
            return 0.0;
        };
        let window = last.saturating_duration_since(first);
        if window.is_zero() {
            return 0.0;
        }
        self.rx_bytes as f64 * 8.0 / window.as_secs_f64()
    }
}

/// The per-flow statistics table.
///
/// Keys are interned on first sight: each [`FlowKey`] maps to a dense
/// [`FlowId`] (assigned from 1 in first-observation order) and the
/// records live in a vec indexed by that id. Iteration is therefore in
/// id order, which is what makes two exports of the same event sequence
/// byte-identical.
#[derive(Debug, Default)]
pub(crate) struct StatsTable {
    index: HashMap<FlowKey, FlowId>,
    records: Vec<(FlowKey, FlowStats)>,
    /// the last assigned ID
    ///
    /// ID 0 is never assigned to a flow
    id: FlowId,
}

impl StatsTable {
    pub(crate) fn new() -> Self {
        Self {
            index: HashMap::new(),
            records: Vec::new(),
            id: FlowId::ZERO,
        }
    }

    /// the id of `key`, interning it with a fresh empty record on first
    /// sight
    pub(crate) fn intern(&mut self, key: FlowKey) -> FlowId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }

        self.id = self.id.next();
        self.index.insert(key, self.id);
        self.records.push((key, FlowStats::default()));

        self.id
    }

    pub(crate) fn id_of(&self, key: &FlowKey) -> Option<FlowId> {
        self.index.get(key).copied()
    }

    pub(crate) fn key_of(&self, id: FlowId) -> Option<&FlowKey> {
        self.records.get(id.index()?).map(|(key, _)| key)
    }

    pub(crate) fn get(&self, id: FlowId) -> Option<&FlowStats> {
        self.records.get(id.index()?).map(|(_, stats)| stats)
    }

    fn get_mut(&mut self, id: FlowId) -> Option<&mut FlowStats> {
        self.records.get_mut(id.index()?).map(|(_, stats)| stats)
    }

    pub(crate) fn on_tx(&mut self, id: FlowId, size: u64, at: SimTime) {
        if let Some(stats) = self.get_mut(id) {
            stats.on_tx(size, at);
        }
    }

    pub(crate) fn on_delivered(&mut self, id: FlowId, size: u64, delay: Duration, at: SimTime) {
        if let Some(stats) = self.get_mut(id) {
            stats.on_delivered(size, delay, at);
        }
    }

    pub(crate) fn on_lost(&mut self, id: FlowId, kind: LossKind) {
        if let Some(stats) = self.get_mut(id) {
            stats.on_lost(kind);
        }
    }

    /// iterate the records in id order
    pub(crate) fn iter(&self) -> impl Iterator<Item = (FlowId, &FlowKey, &FlowStats)> {
        self.records
            .iter()
            .enumerate()
            .map(|(position, (key, stats))| (FlowId::new(position as u64 + 1), key, stats))
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Zero every record while keeping the interned keys and their ids.
    ///
    /// This is the statistics rollover: flows keep their identity across
    /// reporting windows, only the counters restart.
    pub(crate) fn reset(&mut self) {
        for (_, stats) in &mut self.records {
            *stats = FlowStats::default();
        }
    }
}

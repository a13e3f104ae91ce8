//! Pull-based reporting: detached snapshots and their exporters.
//!
//! A [`MonitorSnapshot`] is a point-in-time copy of every flow record,
//! taken with [`FlowMonitor::snapshot`]. It borrows nothing from the
//! monitor, so it can be exported, compared or kept around while events
//! keep flowing. Both exporters iterate the flows in id order, so the
//! same monitor state always renders the same bytes.
//!
//! [`FlowMonitor::snapshot`]: crate::FlowMonitor::snapshot

use crate::{
    event::DropReason,
    flow::{FlowId, FlowKey},
    monitor::Anomalies,
    stats::FlowStats,
    time::SimTime,
};
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Error returned by the export functions.
#[derive(Debug, Error)]
pub enum ExportError {
    /// the destination writer failed
    #[error("failed to write the report")]
    Io(#[from] io::Error),
    /// the structured report could not be serialised
    #[error("failed to serialise the report")]
    Json(#[from] serde_json::Error),
}

/// One flow as captured in a [`MonitorSnapshot`]: its id, its five-tuple
/// and a copy of its statistics record.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub id: FlowId,
    pub key: FlowKey,
    pub stats: FlowStats,
}

/// A point-in-time copy of the whole statistics table.
///
/// Call [`FlowMonitor::sweep`] before taking the snapshot that feeds a
/// final report, so packets that will never resolve are already
/// accounted as lost.
///
/// [`FlowMonitor::sweep`]: crate::FlowMonitor::sweep
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    /// every observed flow, in flow id order
    pub flows: Vec<FlowSnapshot>,
    /// the anomaly counters at snapshot time
    pub anomalies: Anomalies,
    /// packets still in flight at snapshot time, all flows included
    pub in_flight: u64,
}

impl MonitorSnapshot {
    /// Render the line-oriented text report.
    ///
    /// One line per flow:
    ///
    /// ```text
    /// FlowID SrcAddr:SrcPort -> DstAddr:DstPort TxPackets=<n> RxPackets=<n> \
    /// LostPackets=<n> PDR=<0..1> MeanDelaySec=<f> MeanJitterSec=<f> ThroughputBps=<f>
    /// ```
    ///
    /// Float precision is fixed (PDR 4 places, delays 6, throughput 3) so
    /// that equal snapshots always render byte-identical reports.
    pub fn export_text<W: io::Write>(&self, mut writer: W) -> Result<(), ExportError> {
        for flow in &self.flows {
            let stats = &flow.stats;
            writeln!(
                writer,
                "{id} {key} TxPackets={tx} RxPackets={rx} LostPackets={lost} \
                 PDR={pdr:.4} MeanDelaySec={delay:.6} MeanJitterSec={jitter:.6} \
                 ThroughputBps={throughput:.3}",
                id = flow.id,
                key = flow.key,
                tx = stats.tx_packets(),
                rx = stats.rx_packets(),
                lost = stats.lost_packets(),
                pdr = stats.pdr(),
                delay = stats.mean_delay().as_secs_f64(),
                jitter = stats.mean_jitter().as_secs_f64(),
                throughput = stats.throughput_bps(),
            )?;
        }
        Ok(())
    }

    /// Render the structured (JSON) report.
    ///
    /// Carries the same per-flow fields as the text report with explicit
    /// types, plus the raw counters, the loss breakdown, the four window
    /// timestamps and the monitor-level anomaly counters.
    pub fn export_json<W: io::Write>(&self, writer: W) -> Result<(), ExportError> {
        let report = JsonReport {
            flows: self.flows.iter().map(JsonFlow::from).collect(),
            anomalies: JsonAnomalies::from(&self.anomalies),
            in_flight: self.in_flight,
        };
        serde_json::to_writer_pretty(writer, &report)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonReport {
    flows: Vec<JsonFlow>,
    anomalies: JsonAnomalies,
    in_flight: u64,
}

#[derive(Serialize)]
struct JsonAnomalies {
    unknown_rx: u64,
    unknown_drop: u64,
    uid_collisions: u64,
}

impl From<&Anomalies> for JsonAnomalies {
    fn from(anomalies: &Anomalies) -> Self {
        Self {
            unknown_rx: anomalies.unknown_rx,
            unknown_drop: anomalies.unknown_drop,
            uid_collisions: anomalies.uid_collisions,
        }
    }
}

#[derive(Serialize)]
struct JsonFlow {
    flow_id: u64,
    protocol: String,
    source: String,
    source_port: u16,
    destination: String,
    destination_port: u16,
    tx_packets: u64,
    rx_packets: u64,
    lost_packets: u64,
    dropped_packets: u64,
    timed_out_packets: u64,
    superseded_packets: u64,
    drops: Vec<JsonDrop>,
    tx_bytes: u64,
    rx_bytes: u64,
    pdr: f64,
    mean_delay_sec: f64,
    mean_jitter_sec: f64,
    throughput_bps: f64,
    first_tx_sec: Option<f64>,
    last_tx_sec: Option<f64>,
    first_rx_sec: Option<f64>,
    last_rx_sec: Option<f64>,
}

#[derive(Serialize)]
struct JsonDrop {
    reason: &'static str,
    count: u64,
}

impl From<&FlowSnapshot> for JsonFlow {
    fn from(flow: &FlowSnapshot) -> Self {
        let stats = &flow.stats;
        let secs = |at: Option<SimTime>| at.map(SimTime::as_secs_f64);

        // reasons nobody dropped for are omitted; the order of the rest
        // is the fixed report order of `DropReason::ALL`
        let drops = DropReason::ALL
            .into_iter()
            .filter(|reason| stats.drops_of(*reason) != 0)
            .map(|reason| JsonDrop {
                reason: reason.as_str(),
                count: stats.drops_of(reason),
            })
            .collect();

        Self {
            flow_id: flow.id.value(),
            protocol: flow.key.protocol.to_string(),
            source: flow.key.source.to_string(),
            source_port: flow.key.source_port,
            destination: flow.key.destination.to_string(),
            destination_port: flow.key.destination_port,
            tx_packets: stats.tx_packets(),
            rx_packets: stats.rx_packets(),
            lost_packets: stats.lost_packets(),
            dropped_packets: stats.dropped_packets(),
            timed_out_packets: stats.timed_out_packets(),
            superseded_packets: stats.superseded_packets(),
            drops,
            tx_bytes: stats.tx_bytes(),
            rx_bytes: stats.rx_bytes(),
            pdr: stats.pdr(),
            mean_delay_sec: stats.mean_delay().as_secs_f64(),
            mean_jitter_sec: stats.mean_jitter().as_secs_f64(),
            throughput_bps: stats.throughput_bps(),
            first_tx_sec: secs(stats.first_tx()),
            last_tx_sec: secs(stats.last_tx()),
            first_rx_sec: secs(stats.first_rx()),
            last_rx_sec: secs(stats.last_rx()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlowMonitor, Headers, PacketUid};
    use std::net::IpAddr;
    use std::time::Duration;

    fn udp(source_port: u16) -> Headers {
        let src: IpAddr = "10.0.0.1".parse().unwrap();
        let dst: IpAddr = "10.0.0.2".parse().unwrap();
        Headers::udp(src, source_port, dst, 9)
    }

    fn monitor_with_one_delivery() -> FlowMonitor {
        let mut monitor = FlowMonitor::builder().set_log_anomalies(false).build();
        monitor.report_tx(PacketUid::new(1), udp(5000), 100, SimTime::from_secs(1));
        monitor.report_rx(PacketUid::new(1), SimTime::from_millis(1_200));
        monitor
    }

    #[test]
    fn text_line_format() {
        let monitor = monitor_with_one_delivery();

        let mut report = Vec::new();
        monitor.export_text(&mut report).unwrap();

        assert_eq!(
            String::from_utf8(report).unwrap(),
            "1 10.0.0.1:5000 -> 10.0.0.2:9 TxPackets=1 RxPackets=1 LostPackets=0 \
             PDR=1.0000 MeanDelaySec=0.200000 MeanJitterSec=0.000000 ThroughputBps=0.000\n",
        );
    }

    #[test]
    fn text_has_one_line_per_flow_in_id_order() {
        let mut monitor = FlowMonitor::builder().set_log_anomalies(false).build();
        monitor.report_tx(PacketUid::new(1), udp(5002), 100, SimTime::from_secs(1));
        monitor.report_tx(PacketUid::new(2), udp(5001), 100, SimTime::from_secs(1));
        monitor.report_tx(PacketUid::new(3), udp(5000), 100, SimTime::from_secs(1));

        let mut report = Vec::new();
        monitor.export_text(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();

        let ports: Vec<&str> = report
            .lines()
            .map(|line| line.split_whitespace().nth(1).unwrap())
            .collect();
        assert_eq!(
            ports,
            vec!["10.0.0.1:5002", "10.0.0.1:5001", "10.0.0.1:5000"]
        );
    }

    #[test]
    fn export_does_not_mutate() {
        let monitor = monitor_with_one_delivery();
        let before = monitor.snapshot();

        let mut sink = Vec::new();
        monitor.export_text(&mut sink).unwrap();
        monitor.export_json(&mut sink).unwrap();

        assert_eq!(monitor.snapshot(), before);
    }

    #[test]
    fn json_carries_explicit_fields() {
        let mut monitor = monitor_with_one_delivery();
        monitor.report_tx(PacketUid::new(2), udp(5000), 100, SimTime::from_secs(2));
        monitor.report_drop(
            PacketUid::new(2),
            crate::DropReason::QueueOverflow,
            SimTime::from_secs(3),
        );

        let mut report = Vec::new();
        monitor.export_json(&mut report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&report).unwrap();

        let flow = &value["flows"][0];
        assert_eq!(flow["flow_id"], 1);
        assert_eq!(flow["protocol"], "UDP");
        assert_eq!(flow["source"], "10.0.0.1");
        assert_eq!(flow["source_port"], 5000);
        assert_eq!(flow["tx_packets"], 2);
        assert_eq!(flow["rx_packets"], 1);
        assert_eq!(flow["lost_packets"], 1);
        assert_eq!(flow["dropped_packets"], 1);
        assert_eq!(flow["timed_out_packets"], 0);
        assert_eq!(flow["drops"][0]["reason"], "queue_overflow");
        assert_eq!(flow["drops"][0]["count"], 1);
        assert_eq!(flow["pdr"], 0.5);
        assert_eq!(flow["mean_delay_sec"], 0.2);
        assert_eq!(flow["first_tx_sec"], 1.0);
        assert_eq!(flow["last_rx_sec"], 1.2);

        assert_eq!(value["anomalies"]["uid_collisions"], 0);
        assert_eq!(value["in_flight"], 0);
    }

    #[test]
    fn json_null_timestamps_before_any_delivery() {
        let mut monitor = FlowMonitor::builder().set_log_anomalies(false).build();
        monitor.report_tx(PacketUid::new(1), udp(5000), 100, SimTime::from_secs(1));

        let mut report = Vec::new();
        monitor.export_json(&mut report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&report).unwrap();

        let flow = &value["flows"][0];
        assert_eq!(flow["first_rx_sec"], serde_json::Value::Null);
        assert_eq!(flow["last_rx_sec"], serde_json::Value::Null);
        assert_eq!(value["in_flight"], 1);
    }

    #[test]
    fn equal_snapshots_render_equal_reports() {
        let monitor = monitor_with_one_delivery();
        let snapshot = monitor.snapshot();

        let mut first = Vec::new();
        let mut second = Vec::new();
        snapshot.export_json(&mut first).unwrap();
        snapshot.export_json(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn snapshot_survives_later_events() {
        let mut monitor = monitor_with_one_delivery();
        let snapshot = monitor.snapshot();

        monitor.report_tx(PacketUid::new(9), udp(6000), 100, SimTime::from_secs(5));
        monitor.sweep(SimTime::from_secs(60));

        assert_eq!(snapshot.flows.len(), 1);
        assert_eq!(snapshot.flows[0].stats.mean_delay(), Duration::from_millis(200));
    }
}

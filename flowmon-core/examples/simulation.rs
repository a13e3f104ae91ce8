use anyhow::{Context, Result};
use flowmon_core::{DropReason, FlowMonitor, Headers, LossTimeout, PacketUidGenerator, SimTime};
use indicatif::ProgressBar;
use rand_chacha::ChaChaRng;
use rand_core::{Rng, SeedableRng as _};
use std::{
    io::{stdout, Write},
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

const PACKETS: u64 = 100_000;
const SENDERS: u8 = 4;

/// Drive a monitor with a synthetic workload, the way a discrete-event
/// simulator would: a handful of UDP flows towards one sink, most
/// packets delivered after a small random delay, some dropped on the
/// way and some silently lost for the sweep to reclaim. Then print the
/// report.
fn main() -> Result<()> {
    let mut monitor = FlowMonitor::builder()
        .set_loss_timeout(LossTimeout::new(Duration::from_secs(5)))
        .build();
    let uids = PacketUidGenerator::new();
    let mut rng = ChaChaRng::seed_from_u64(42);

    let sink = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 100));
    let mut now = SimTime::ZERO;

    let pb = ProgressBar::new(PACKETS);
    for _ in 0..PACKETS {
        now += Duration::from_micros(50 + rng.next_u64() % 500);

        let sender = (rng.next_u64() % u64::from(SENDERS)) as u8;
        let headers = Headers::udp(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1 + sender)),
            49_152 + u16::from(sender),
            sink,
            9_000,
        );

        let uid = uids.generate();
        let size = 64 + rng.next_u64() % 1_400;
        monitor.report_tx(uid, headers, size, now);

        match rng.next_u64() % 100 {
            // ~2% explicitly dropped by a congested queue
            0..=1 => monitor.report_drop(uid, DropReason::QueueOverflow, now),
            // ~1% lost without a trace: the sweep will reclaim them
            2 => {}
            // the rest arrive after 1..40ms
            _ => {
                let delay = Duration::from_micros(1_000 + rng.next_u64() % 39_000);
                monitor.report_rx(uid, now + delay);
            }
        }

        pb.inc(1);
    }
    pb.finish_with_message("traffic replayed");

    // reclaim the silent losses before reporting
    now += Duration::from_secs(10);
    let reclaimed = monitor.sweep(now);
    println!("{reclaimed} packets reclaimed as lost by the sweep");

    let mut out = stdout().lock();
    monitor
        .export_text(&mut out)
        .context("failed to render the report")?;
    out.flush()?;

    Ok(())
}

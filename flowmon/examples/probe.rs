use clap::Parser;
use flowmon::{
    DropReason, FlowMonitor, Headers, LossTimeout, PacketUidGenerator, SharedMonitor, Sweeper,
    WallClock,
};
use rand::Rng as _;
use std::{
    io::stdout,
    net::{IpAddr, Ipv4Addr},
    thread::{self, sleep},
    time::Duration,
};

/// Synthetic live probe: several producer threads report packet
/// lifecycle events against a shared monitor while a background
/// sweeper reclaims the ones that never resolve. Prints the per-flow
/// report at the end.
#[derive(Parser)]
struct Command {
    /// how long to run, in seconds
    #[arg(long, default_value = "5")]
    time: u64,

    /// how many producer threads to run
    #[arg(long, default_value = "3")]
    producers: u16,

    /// emit a packet every this many milliseconds per producer
    #[arg(long, default_value = "2")]
    every: u64,

    /// print the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

const LOSS_TIMEOUT: Duration = Duration::from_secs(1);

fn main() {
    let cmd = Command::parse();

    tracing_subscriber::fmt::init();

    let monitor = SharedMonitor::from_monitor(
        FlowMonitor::builder()
            .set_loss_timeout(LossTimeout::new(LOSS_TIMEOUT))
            .build(),
    );
    let clock = WallClock::start();
    let uids = PacketUidGenerator::new();

    let sweeper = Sweeper::spawn_every(monitor.clone(), clock, Duration::from_millis(100));

    let producers: Vec<_> = (0..cmd.producers)
        .map(|producer| {
            let monitor = monitor.clone();
            let uids = uids.clone();
            let every = Duration::from_millis(cmd.every);
            let deadline = clock.now() + Duration::from_secs(cmd.time);

            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let headers = Headers::udp(
                    IpAddr::V4(Ipv4Addr::new(10, 0, u8::try_from(producer % 250).unwrap(), 1)),
                    49_152 + producer,
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 100)),
                    9_000,
                );

                while clock.now() < deadline {
                    let uid = uids.generate();
                    let size = rng.gen_range(64..=1_500);
                    monitor.report_tx(uid, headers, size, clock.now()).unwrap();

                    // most packets come back a few ms later; some are
                    // dropped, some vanish for the sweeper to find
                    match rng.gen_range(0..100u8) {
                        0..=1 => monitor
                            .report_drop(uid, DropReason::QueueOverflow, clock.now())
                            .unwrap(),
                        2 => {}
                        _ => {
                            sleep(Duration::from_micros(rng.gen_range(100..3_000)));
                            monitor.report_rx(uid, clock.now()).unwrap();
                        }
                    }

                    sleep(every);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    // let the last in-flight packets age out, then stop the sweeper
    sleep(LOSS_TIMEOUT);
    sweeper.shutdown().unwrap();

    if cmd.json {
        monitor.export_json(stdout().lock()).unwrap();
        println!();
    } else {
        monitor.export_text(stdout().lock()).unwrap();
    }
}

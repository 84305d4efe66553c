//! Shared bus example application
//!
//! Attaches a set of nodes to one simulated 10BASE-T1S style segment, has
//! every node send frames to its neighbour and reports deliveries and
//! collisions, with or without PLCA.
//
// Copyright 2021 Ryan Kurte

use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use structopt::StructOpt;

use csma_plca::prelude::*;
use csma_plca::timer::{PS_PER_NS, PS_PER_US};

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
enum Mode {
    Csma,
    Plca,
    RoundRobin,
}

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, default_value = "4")]
    /// Number of nodes on the bus
    pub nodes: usize,

    #[structopt(long, default_value = "plca")]
    /// Access method (csma, plca, round-robin)
    pub mode: Mode,

    #[structopt(long, default_value = "10")]
    /// Frames queued by each node
    pub frames: usize,

    #[structopt(long, default_value = "46")]
    /// Payload length in bytes
    pub payload: usize,

    #[structopt(long, default_value = "10000000")]
    /// Line rate in bits per second
    pub bitrate: u64,

    #[structopt(long, default_value = "50ns", parse(try_from_str = humantime::parse_duration))]
    /// Propagation delay across the segment
    pub propagation: Duration,

    #[structopt(long, default_value = "100ms", parse(try_from_str = humantime::parse_duration))]
    /// Simulated time to run for
    pub duration: Duration,

    #[structopt(long, default_value = "1")]
    /// Base seed for backoff
    pub seed: u64,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

fn to_sim_time(d: Duration) -> SimTime {
    d.as_nanos() as SimTime * PS_PER_NS
}

fn node_config(opts: &Options, index: usize) -> NodeConfig {
    let plca = match opts.mode {
        Mode::Csma => PlcaMode::Disabled,
        Mode::Plca => PlcaMode::Clause148(PlcaConfig::new(index as u8, opts.nodes as u16)),
        Mode::RoundRobin => PlcaMode::RoundRobin(RoundRobinConfig {
            node_count: opts.nodes as u8,
            local_id: index as u8,
            ..Default::default()
        }),
    };

    NodeConfig {
        bitrate: opts.bitrate,
        plca,
        ..NodeConfig::new(MacAddress::local(index as u32 + 1))
    }
}

fn main() -> anyhow::Result<()> {
    // Load options
    let opts = Options::from_args();

    // Initialise logging
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    if opts.nodes < 2 || opts.nodes > 255 {
        return Err(anyhow::anyhow!("node count must be between 2 and 255"));
    }

    info!("Starting {} node {} bus for {:?}", opts.nodes, opts.mode, opts.duration);

    let mut net = Network::new(NetworkConfig {
        propagation_delay: to_sim_time(opts.propagation),
        seed: opts.seed,
    });

    for i in 0..opts.nodes {
        net.add_node(node_config(&opts, i))?;
    }

    // Queue traffic once PLCA had time to come up
    let start = 100 * PS_PER_US;
    for i in 0..opts.nodes {
        let dst = MacAddress::local(((i + 1) % opts.nodes) as u32 + 1);
        let src = MacAddress::local(i as u32 + 1);

        for _ in 0..opts.frames {
            let frame = Frame::new(EthernetHeader::new(dst, src, 0x0800), Bytes::from(vec![i as u8; opts.payload]));
            net.schedule_enqueue(start, i, frame)?;
        }
    }

    debug!("Running simulation");

    net.run_until(to_sim_time(opts.duration))?;

    // Summarise
    let collisions = net.trace().iter().filter(|r| r.event == TelemetryEvent::Collision).count();
    let drops = net.trace().iter().filter(|r| matches!(&r.event,
        TelemetryEvent::PacketDropped(d) if d.reason != DropReason::NotAddressedToUs)).count();

    for i in 0..opts.nodes {
        let rx: Vec<_> = net.deliveries().iter().filter(|r| r.node == i).collect();
        let last = rx.last().map(|r| r.at / PS_PER_US).unwrap_or(0);
        println!("node {}: received {} frames, last at {} us", i, rx.len(), last);
    }

    println!("deliveries: {}", net.deliveries().len());
    println!("collisions: {}", collisions);
    println!("drops: {}", drops);

    Ok(())
}

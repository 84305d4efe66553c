//! PLCA scenarios, turns are handed out so the medium never collides

mod common;

use csma_plca::prelude::*;
use csma_plca::timer::{PS_PER_NS, PS_PER_US};

use common::*;

fn clause148_bus(n: usize) -> Network {
    bus(NetworkConfig::default(), n, |i| NodeConfig {
        plca: PlcaMode::Clause148(PlcaConfig::new(i as u8, n as u16)),
        ..NodeConfig::new(address(i as u32))
    })
}

fn burst_bus(net_config: NetworkConfig, n: usize, max_burst_count: u32) -> Network {
    bus(net_config, n, |i| NodeConfig {
        plca: PlcaMode::Clause148(PlcaConfig {
            max_burst_count,
            ..PlcaConfig::new(i as u8, n as u16)
        }),
        ..NodeConfig::new(address(i as u32))
    })
}

/// Queue `count` frames on every node for its successor on the ring
fn enqueue_ring(net: &mut Network, n: usize, count: usize, at: SimTime) {
    for _ in 0..count {
        for i in 0..n {
            let dst = (i + 1) % n;
            net.schedule_enqueue(at, i, frame(i as u32, dst as u32)).unwrap();
        }
    }
}

/// Spans during which a node held a transmit opportunity, from its
/// control state reaching Commit, Transmit or Burst until it leaves them
fn opportunity_spans(net: &Network) -> Vec<(usize, SimTime, SimTime)> {
    let mut open: Vec<Option<SimTime>> = vec![None; net.nodes().len()];
    let mut spans = Vec::new();

    for r in net.trace() {
        if let TelemetryEvent::PlcaStateChanged { control, .. } = r.event {
            let holding = matches!(control, ControlState::Commit | ControlState::Transmit | ControlState::Burst);
            match (open[r.node], holding) {
                (None, true) => open[r.node] = Some(r.at),
                (Some(start), false) => {
                    spans.push((r.node, start, r.at));
                    open[r.node] = None;
                },
                _ => (),
            }
        }
    }

    for (node, start) in open.iter().enumerate() {
        if let Some(start) = start {
            spans.push((node, *start, net.now()));
        }
    }

    spans
}

/// Most frames a node started within one transmit opportunity
fn max_frames_per_turn(net: &Network, node: usize) -> usize {
    let mut max = 0;
    let mut current = 0;

    for r in net.trace().iter().filter(|r| r.node == node) {
        match r.event {
            TelemetryEvent::PlcaCurrentId(_) => current = 0,
            TelemetryEvent::TransmissionStarted { kind: SignalKind::Data, .. } => {
                current += 1;
                max = max.max(current);
            },
            _ => (),
        }
    }

    max
}

fn coordinator(net: &Network, i: usize) -> &PlcaCoordinator {
    match net.node(i).and_then(|n| n.plca()) {
        Some(Plca::Clause148(c)) => c,
        _ => panic!("node {} has no clause 148 coordinator", i),
    }
}

#[test]
fn beacons_activate_every_node() {
    init_logging();

    let mut net = clause148_bus(4);
    net.run_until(100 * PS_PER_US).unwrap();

    for i in 0..4 {
        let c = coordinator(&net, i);
        assert!(c.plca_status(), "node {} inactive", i);
        assert_eq!(c.status_state(), StatusState::Active);
    }

    // Only node 0 sends beacons
    let beacons: Vec<_> = net.trace().iter()
        .filter(|r| matches!(r.event, TelemetryEvent::TransmissionStarted { kind: SignalKind::Beacon, .. }))
        .map(|r| r.node)
        .collect();
    assert!(beacons.len() > 1);
    assert!(beacons.iter().all(|n| *n == 0));

    // First beacon once node 0 has counted through every turn
    let first = net.trace().iter()
        .find(|r| matches!(r.event, TelemetryEvent::TransmissionStarted { kind: SignalKind::Beacon, .. }))
        .unwrap();
    assert_eq!(first.at, 4 * 320 * PS_PER_NS);
}

#[test]
fn contending_nodes_share_the_medium_without_collisions() {
    init_logging();

    let n = 4;
    let mut net = clause148_bus(n);

    // Let PLCA come up, then everyone wants the medium at once
    for _ in 0..3 {
        for i in 0..n {
            let dst = (i + 1) % n;
            net.schedule_enqueue(20 * PS_PER_US, i, frame(i as u32, dst as u32)).unwrap();
        }
    }

    net.run_until(5_000 * PS_PER_US).unwrap();

    assert_eq!(collisions(&net), 0);

    for i in 0..n {
        let from = (i + n - 1) % n;
        assert_eq!(received_from(&net, i), vec![address(from as u32); 3], "node {}", i);
        assert!(drops(&net, i).iter().all(|d| *d == DropReason::NotAddressedToUs));
        assert!(coordinator(&net, i).plca_status());
    }

    // Deferred frames were announced with a commit first
    let commits = net.trace().iter()
        .filter(|r| matches!(r.event, TelemetryEvent::TransmissionStarted { kind: SignalKind::Commit, .. }))
        .count();
    assert!(commits >= 3 * n);
}

#[test]
fn pending_node_transmits_only_in_its_turn() {
    init_logging();

    let mut net = clause148_bus(4);
    net.schedule_enqueue(20 * PS_PER_US, 2, frame(2, 0)).unwrap();

    net.run_until(200 * PS_PER_US).unwrap();

    assert_eq!(received_from(&net, 0), vec![address(2)]);
    assert_eq!(collisions(&net), 0);

    // Nothing but beacons from node 0 and the frame from node 2
    let starts: Vec<_> = net.trace().iter()
        .filter_map(|r| match r.event {
            TelemetryEvent::TransmissionStarted { kind, .. } if kind != SignalKind::Beacon => Some((r.node, r.at, kind)),
            _ => None,
        })
        .collect();
    assert!(!starts.is_empty());
    assert!(starts.iter().all(|(n, _, _)| *n == 2));

    // Every node agrees the commit happened in turn 2
    let (_, at, kind) = starts[0];
    assert_eq!(kind, SignalKind::Commit);

    for i in 0..4 {
        let turn = net.trace().iter()
            .filter(|r| r.node == i && r.at <= at)
            .filter_map(|r| match r.event {
                TelemetryEvent::PlcaCurrentId(id) => Some(id),
                _ => None,
            })
            .last();
        assert_eq!(turn, Some(2), "node {}", i);
    }
}

#[test]
fn disabled_node_falls_back_to_csma() {
    let mut net = bus(NetworkConfig::default(), 2, |i| NodeConfig {
        plca: PlcaMode::Clause148(PlcaConfig { enabled: false, ..PlcaConfig::new(i as u8, 2) }),
        ..NodeConfig::new(address(i as u32))
    });

    net.schedule_enqueue(0, 0, frame(0, 1)).unwrap();
    net.run_until(100 * PS_PER_US).unwrap();

    assert_eq!(received_from(&net, 1), vec![address(0)]);
    assert_eq!(net.deliveries()[0].at, 5_760 * PS_PER_NS);
    assert!(!coordinator(&net, 0).plca_status());
    assert_eq!(coordinator(&net, 1).data_state(), DataState::Normal);
}

#[test]
fn plca_with_full_duplex_is_rejected() {
    let mut net = Network::new(NetworkConfig::default());
    let config = NodeConfig {
        full_duplex: true,
        plca: PlcaMode::Clause148(PlcaConfig::new(0, 2)),
        ..NodeConfig::new(address(0))
    };
    assert!(matches!(net.add_node(config), Err(Error::InvalidConfig(_))));
}

#[test]
fn round_robin_turns_order_transmissions() {
    init_logging();

    let n = 3;
    let mut net = bus(NetworkConfig::default(), n, |i| NodeConfig {
        plca: PlcaMode::RoundRobin(RoundRobinConfig {
            node_count: n as u8,
            local_id: i as u8,
            to_bits: 200,
            ..Default::default()
        }),
        ..NodeConfig::new(address(i as u32))
    });

    // Queued in reverse, sent in turn order
    for i in (0..n).rev() {
        net.schedule_enqueue(5 * PS_PER_US, i, frame(i as u32, ((i + 1) % n) as u32)).unwrap();
    }

    net.run_until(200 * PS_PER_US).unwrap();

    assert_eq!(collisions(&net), 0);

    let sources: Vec<_> = net.deliveries().iter().map(|r| r.delivery.source).collect();
    assert_eq!(sources, vec![address(0), address(1), address(2)]);

    // Cycle restarts at 6.2 us, node 0 sends after the 200 ns beacon and the gap
    assert_eq!(net.deliveries()[0].at, (6_200 + 200 + 960 + 5_760) * PS_PER_NS);
}

#[test]
fn bursting_nodes_share_the_medium_without_collisions() {
    init_logging();

    let n = 3;
    let mut net = burst_bus(NetworkConfig::default(), n, 1);
    enqueue_ring(&mut net, n, 20, 20 * PS_PER_US);

    net.run_until(2_000 * PS_PER_US).unwrap();

    assert_eq!(collisions(&net), 0);

    for i in 0..n {
        let from = (i + n - 1) % n;
        assert_eq!(received_from(&net, i), vec![address(from as u32); 20], "node {}", i);
        assert!(drops(&net, i).iter().all(|d| *d == DropReason::NotAddressedToUs));

        // One burst frame on top of the committed one
        assert_eq!(max_frames_per_turn(&net, i), 2, "node {}", i);
    }
}

#[test]
fn long_bursts_with_four_nodes() {
    init_logging();

    let n = 4;
    let mut net = burst_bus(NetworkConfig::default(), n, 3);
    enqueue_ring(&mut net, n, 12, 20 * PS_PER_US);

    net.run_until(2_000 * PS_PER_US).unwrap();

    assert_eq!(collisions(&net), 0);

    for i in 0..n {
        assert_eq!(received_from(&net, i).len(), 12, "node {}", i);
        assert_eq!(max_frames_per_turn(&net, i), 4, "node {}", i);
    }
}

#[test]
fn burst_ends_when_the_mac_has_nothing_more() {
    init_logging();

    let mut net = burst_bus(NetworkConfig::default(), 2, 3);
    net.schedule_enqueue(20 * PS_PER_US, 1, frame(1, 0)).unwrap();
    net.schedule_enqueue(20 * PS_PER_US, 1, frame(1, 0)).unwrap();

    net.run_until(200 * PS_PER_US).unwrap();

    assert_eq!(collisions(&net), 0);
    assert_eq!(received_from(&net, 0), vec![address(1); 2]);
    assert_eq!(max_frames_per_turn(&net, 1), 2);

    // The burst commit after the last frame is cut when the burst timer expires
    let last_frame = net.trace().iter()
        .filter(|r| r.node == 1)
        .filter(|r| matches!(r.event, TelemetryEvent::TransmissionEnded { kind: SignalKind::Data, .. }))
        .last()
        .unwrap();
    let burst_bits = csma_plca::plca::BURST_TIMER_BITS;

    let cut = net.trace().iter()
        .filter(|r| r.node == 1 && r.at > last_frame.at)
        .find(|r| matches!(r.event, TelemetryEvent::TransmissionEnded { kind: SignalKind::Commit, truncated: true, .. }))
        .unwrap();
    assert_eq!(cut.at, last_frame.at + bits_to_time(burst_bits, 100_000_000));
}

#[test]
fn one_node_holds_each_opportunity_with_propagation_delay() {
    init_logging();

    let n = 4;
    let net_config = NetworkConfig { propagation_delay: 100 * PS_PER_NS, seed: 3 };

    for max_burst_count in 0..2 {
        let mut net = burst_bus(net_config.clone(), n, max_burst_count);
        enqueue_ring(&mut net, n, 5, 20 * PS_PER_US);

        net.run_until(2_000 * PS_PER_US).unwrap();

        assert_eq!(collisions(&net), 0);
        for i in 0..n {
            assert_eq!(received_from(&net, i).len(), 5, "node {} burst {}", i, max_burst_count);
        }

        let spans = opportunity_spans(&net);
        assert!(spans.len() >= n);

        for (i, a) in spans.iter().enumerate() {
            for b in spans[i + 1..].iter().filter(|b| b.0 != a.0) {
                assert!(a.2 <= b.1 || b.2 <= a.1, "nodes {} and {} overlap: {:?} {:?}", a.0, b.0, a, b);
            }
        }
    }
}

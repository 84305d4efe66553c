//! Helpers shared by the bus scenarios

#![allow(dead_code)]

use bytes::Bytes;

use csma_plca::prelude::*;

pub fn init_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Info, simplelog::Config::default());
}

pub fn address(n: u32) -> MacAddress {
    MacAddress::local(n + 1)
}

/// Minimum size frame from node `src` to node `dst`
pub fn frame(src: u32, dst: u32) -> Frame {
    frame_with_payload(src, dst, 46)
}

pub fn frame_with_payload(src: u32, dst: u32, len: usize) -> Frame {
    let header = EthernetHeader::new(address(dst), address(src), 0x0800);
    Frame::new(header, Bytes::from(vec![src as u8; len]))
}

/// Add `n` nodes built from `config(index)`
pub fn bus<F>(net_config: NetworkConfig, n: usize, config: F) -> Network
where
    F: Fn(usize) -> NodeConfig,
{
    let mut net = Network::new(net_config);
    for i in 0..n {
        let index = net.add_node(config(i)).unwrap();
        assert_eq!(index, i);
    }
    net
}

pub fn collisions(net: &Network) -> usize {
    net.trace().iter().filter(|r| r.event == TelemetryEvent::Collision).count()
}

pub fn drops(net: &Network, node: usize) -> Vec<DropReason> {
    net.trace().iter()
        .filter(|r| r.node == node)
        .filter_map(|r| match &r.event {
            TelemetryEvent::PacketDropped(d) => Some(d.reason),
            _ => None,
        })
        .collect()
}

/// Source node of each delivery at `node`, in order
pub fn received_from(net: &Network, node: usize) -> Vec<MacAddress> {
    net.deliveries().iter()
        .filter(|r| r.node == node)
        .map(|r| r.delivery.source)
        .collect()
}

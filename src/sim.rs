//! Discrete-event shared bus simulation
//!
//! A [`Network`] owns a set of [`SimNode`]s attached to one medium. Signals
//! sent by a node reach every other node after the configured propagation
//! delay, timers are cancelled by bumping a per-timer generation so stale
//! expiries are skipped when they are popped.
//!
//! Events at the same instant run in scheduling order, except that a PHY
//! channel idle expiry runs after every signal arriving at that instant. A
//! signal starting exactly as the previous one ends then extends the
//! reception instead of dropping carrier in between.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::vec::Vec;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Error;
use crate::frame::Frame;
use crate::mac::{Delivery, FifoQueue};
use crate::node::{Host, Node, NodeConfig};
use crate::phy::{Signal, TransmissionId};
use crate::telemetry::{Observer, TelemetryEvent};
use crate::timer::{PhyTimer, SimTime, TimerId};

/// Transmit queue depth of simulated nodes
pub const QUEUE_DEPTH: usize = 64;

pub type SimNode = Node<StdRng, FifoQueue<QUEUE_DEPTH>>;

#[derive(Clone, PartialEq, Debug)]
pub struct NetworkConfig {
    /// Delay between a node sending a signal and the others seeing it
    pub propagation_delay: SimTime,

    /// Base seed, node `n` uses `seed + n` for its backoff RNG
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            propagation_delay: 0,
            seed: 1,
        }
    }
}

/// Frame delivered to a node's upper layer
#[derive(Clone, PartialEq, Debug)]
pub struct Received {
    pub node: usize,
    pub at: SimTime,
    pub delivery: Delivery,
}

/// Telemetry event tagged with its source node and time
#[derive(Clone, PartialEq, Debug)]
pub struct TraceRecord {
    pub node: usize,
    pub at: SimTime,
    pub event: TelemetryEvent,
}

#[derive(Debug)]
enum Action {
    Timer(TimerId, u64),
    Signal(Signal),
    Enqueue(Frame),
}

impl Action {
    /// Ordering within one instant, lower runs first
    fn priority(&self) -> u8 {
        match self {
            Action::Timer(TimerId::Phy(PhyTimer::RxChannelIdle), _) => 1,
            _ => 0,
        }
    }
}

#[derive(Debug)]
struct Event {
    at: SimTime,
    priority: u8,
    seq: u64,
    node: usize,
    action: Action,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Earliest first, then by priority, ties in scheduling order
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.priority, self.seq).cmp(&(other.at, other.priority, other.seq))
    }
}

/// Everything except the nodes, so a node can be borrowed alongside it
#[derive(Debug)]
struct Medium {
    config: NetworkConfig,
    now: SimTime,
    seq: u64,
    events: BinaryHeap<Reverse<Event>>,
    generations: HashMap<(usize, TimerId), u64>,
    next_transmission: u64,
    node_count: usize,
    received: Vec<Received>,
    trace: Vec<TraceRecord>,
}

impl Medium {
    fn push(&mut self, at: SimTime, node: usize, action: Action) {
        self.seq += 1;
        let priority = action.priority();
        self.events.push(Reverse(Event { at, priority, seq: self.seq, node, action }));
    }

    fn bump(&mut self, node: usize, timer: TimerId) -> u64 {
        let g = self.generations.entry((node, timer)).or_insert(0);
        *g += 1;
        *g
    }

    fn is_current(&self, node: usize, timer: TimerId, generation: u64) -> bool {
        self.generations.get(&(node, timer)) == Some(&generation)
    }
}

/// Host view of the medium for one node
struct Port<'a> {
    medium: &'a mut Medium,
    index: usize,
}

impl <'a> Observer for Port<'a> {
    fn observe(&mut self, event: TelemetryEvent) {
        self.medium.trace.push(TraceRecord { node: self.index, at: self.medium.now, event });
    }
}

impl <'a> Host for Port<'a> {
    fn now(&self) -> SimTime {
        self.medium.now
    }

    fn schedule_after(&mut self, delay: SimTime, timer: TimerId) {
        let generation = self.medium.bump(self.index, timer);
        let at = self.medium.now + delay;
        self.medium.push(at, self.index, Action::Timer(timer, generation));
    }

    fn cancel(&mut self, timer: TimerId) {
        self.medium.bump(self.index, timer);
    }

    fn send_signal(&mut self, mut signal: Signal) -> TransmissionId {
        if !signal.is_update {
            self.medium.next_transmission += 1;
            signal.transmission_id = TransmissionId(self.medium.next_transmission);
        }
        let id = signal.transmission_id;

        let at = self.medium.now + self.medium.config.propagation_delay;
        let index = self.index;
        for n in (0..self.medium.node_count).filter(|n| *n != index) {
            self.medium.push(at, n, Action::Signal(signal.clone()));
        }

        id
    }

    fn deliver(&mut self, delivery: Delivery) {
        self.medium.received.push(Received { node: self.index, at: self.medium.now, delivery });
    }
}

/// Shared bus network of simulated nodes
pub struct Network {
    nodes: Vec<SimNode>,
    medium: Medium,
    started: bool,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            nodes: Vec::new(),
            medium: Medium {
                config,
                now: 0,
                seq: 0,
                events: BinaryHeap::new(),
                generations: HashMap::new(),
                next_transmission: 0,
                node_count: 0,
                received: Vec::new(),
                trace: Vec::new(),
            },
            started: false,
        }
    }

    /// Attach a node to the bus, returning its index
    pub fn add_node(&mut self, config: NodeConfig) -> Result<usize, Error> {
        let index = self.nodes.len();
        let rng = StdRng::seed_from_u64(self.medium.config.seed.wrapping_add(index as u64));

        debug!("Adding node {} ({})", index, config.address);

        self.nodes.push(Node::new(config, rng, FifoQueue::new())?);
        self.medium.node_count = self.nodes.len();

        if self.started {
            self.nodes[index].start(&mut Port { medium: &mut self.medium, index })?;
        }

        Ok(index)
    }

    pub fn now(&self) -> SimTime {
        self.medium.now
    }

    pub fn node(&self, index: usize) -> Option<&SimNode> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut SimNode> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Frames delivered so far, in delivery order
    pub fn deliveries(&self) -> &[Received] {
        &self.medium.received
    }

    /// Telemetry from every node, in emission order
    pub fn trace(&self) -> &[TraceRecord] {
        &self.medium.trace
    }

    pub fn set_interface_up(&mut self, index: usize, up: bool) -> Result<(), Error> {
        self.nodes.get_mut(index)
            .ok_or(Error::InvalidConfig("unknown node index"))?
            .set_interface_up(up);
        Ok(())
    }

    /// Hand `frame` to the transmit queue of `node` at time `at`
    pub fn schedule_enqueue(&mut self, at: SimTime, node: usize, frame: Frame) -> Result<(), Error> {
        if node >= self.nodes.len() {
            return Err(Error::InvalidConfig("unknown node index"));
        }

        let at = at.max(self.medium.now);
        self.medium.push(at, node, Action::Enqueue(frame));
        Ok(())
    }

    /// Process events up to and including `end`.
    ///
    /// Nodes are started on the first call, errors from any node abort
    /// the run.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), Error> {
        if !self.started {
            self.start()?;
        }

        while let Some(Reverse(next)) = self.medium.events.peek() {
            if next.at > end {
                break;
            }

            let Reverse(event) = match self.medium.events.pop() {
                Some(e) => e,
                None => break,
            };

            self.medium.now = event.at;
            self.dispatch(event)?;
        }

        self.medium.now = self.medium.now.max(end);

        info!("Simulation reached {} ps, {} frames delivered", self.medium.now, self.medium.received.len());

        Ok(())
    }

    fn start(&mut self) -> Result<(), Error> {
        debug!("Starting {} nodes", self.nodes.len());

        self.started = true;
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.start(&mut Port { medium: &mut self.medium, index })?;
        }

        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<(), Error> {
        let index = event.node;
        let node = self.nodes.get_mut(index)
            .ok_or(Error::InconsistentState("event for unknown node"))?;

        match event.action {
            Action::Timer(timer, generation) => {
                if !self.medium.is_current(index, timer, generation) {
                    trace!("Skipping stale timer {:?} on node {}", timer, index);
                    return Ok(());
                }
                node.handle_timer(timer, &mut Port { medium: &mut self.medium, index })
            },
            Action::Signal(signal) => {
                node.handle_signal(signal, &mut Port { medium: &mut self.medium, index })
            },
            Action::Enqueue(frame) => {
                node.queue_mut().enqueue(frame)?;
                node.handle_can_dequeue(&mut Port { medium: &mut self.medium, index })
            },
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::frame::{EthernetHeader, MacAddress};
    use crate::phy::SignalKind;
    use crate::timer::{MacTimer, PS_PER_NS, PS_PER_US};

    #[test]
    fn cancelled_timers_are_skipped() {
        let mut medium = Network::new(NetworkConfig::default()).medium;
        medium.node_count = 1;

        let mut port = Port { medium: &mut medium, index: 0 };
        port.schedule_after(10, TimerId::Mac(MacTimer::Backoff));
        port.cancel(TimerId::Mac(MacTimer::Backoff));
        port.schedule_after(20, TimerId::Mac(MacTimer::Backoff));

        let first = medium.events.pop().unwrap().0;
        assert_eq!(first.at, 10);
        match first.action {
            Action::Timer(t, g) => assert!(!medium.is_current(0, t, g)),
            _ => panic!("unexpected action"),
        }

        let second = medium.events.pop().unwrap().0;
        match second.action {
            Action::Timer(t, g) => assert!(medium.is_current(0, t, g)),
            _ => panic!("unexpected action"),
        }
    }

    #[test]
    fn channel_idle_runs_after_same_instant_arrivals() {
        let mut medium = Network::new(NetworkConfig { propagation_delay: 10, seed: 1 }).medium;
        medium.node_count = 2;

        let mut port = Port { medium: &mut medium, index: 0 };
        port.schedule_after(10, TimerId::Phy(PhyTimer::RxChannelIdle));
        port.schedule_after(10, TimerId::Mac(MacTimer::Backoff));

        // Arrives at node 0 at 10, scheduled after both timers
        let commit = Signal::control(SignalKind::Commit, 512, 100_000_000, 0);
        Port { medium: &mut medium, index: 1 }.send_signal(commit);

        let order: Vec<_> = core::iter::from_fn(|| medium.events.pop())
            .map(|Reverse(e)| match e.action {
                Action::Timer(TimerId::Phy(_), _) => "idle",
                Action::Timer(_, _) => "timer",
                Action::Signal(_) => "signal",
                Action::Enqueue(_) => "enqueue",
            })
            .collect();
        assert_eq!(order, std::vec!["timer", "signal", "idle"]);
    }

    #[test]
    fn unicast_between_two_nodes() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let mut net = Network::new(NetworkConfig { propagation_delay: 100 * PS_PER_NS, seed: 7 });
        let a = net.add_node(NodeConfig::new(MacAddress::local(1))).unwrap();
        let b = net.add_node(NodeConfig::new(MacAddress::local(2))).unwrap();

        let h = EthernetHeader::new(MacAddress::local(2), MacAddress::local(1), 0x0800);
        net.schedule_enqueue(0, a, Frame::new(h, Bytes::from_static(&[0xab; 100]))).unwrap();

        net.run_until(100 * PS_PER_US).unwrap();

        let rx = net.deliveries();
        assert_eq!(rx.len(), 1);
        assert_eq!(rx[0].node, b);
        assert_eq!(rx[0].delivery.source, MacAddress::local(1));
        // 118 byte frame and 8 byte PHY header after 100 ns propagation
        assert_eq!(rx[0].at, 10_080 * PS_PER_NS + 100 * PS_PER_NS);

        assert!(net.trace().iter().all(|r| r.event != TelemetryEvent::Collision));
    }
}

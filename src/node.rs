//! Network interface composed of MAC, optional PLCA and PHY
//
// Copyright 2021 Ryan Kurte

use alloc::collections::VecDeque;

use log::{debug, error, trace};
use rand_core::RngCore;

use crate::error::{DropReason, Error, PacketDrop};
use crate::frame::{FcsMode, Frame, MacAddress};
use crate::mac::{CsmaMac, Delivery, MacConfig, MacContext, TxQueue, MAX_ATTEMPTS};
use crate::phy::{CsmaPhy, PhyConfig, PhyContext, PhyIndication, PhyRequest, Signal, SignalKind, TransmissionId};
use crate::plca::{Plca, PlcaConfig, PlcaContext, PlcaCoordinator, RoundRobinConfig, RoundRobinPlca};
use crate::telemetry::{Observer, TelemetryEvent};
use crate::timer::{MacTimer, PhyTimer, PlcaTimer, Scheduler, SimTime, TimerId};

/// Services a node needs from the simulation around it
pub trait Host: Observer {
    fn now(&self) -> SimTime;

    /// Fire `timer` on this node after `delay`, replacing a pending one
    fn schedule_after(&mut self, delay: SimTime, timer: TimerId);

    fn cancel(&mut self, timer: TimerId);

    /// Put a signal on the medium, new transmissions are assigned an id
    fn send_signal(&mut self, signal: Signal) -> TransmissionId;

    /// Hand a received frame to the upper layer
    fn deliver(&mut self, delivery: Delivery);
}

/// PLCA variant to run between MAC and PHY
#[derive(Clone, PartialEq, Debug)]
pub enum PlcaMode {
    Disabled,
    Clause148(PlcaConfig),
    RoundRobin(RoundRobinConfig),
}

/// Per interface configuration
#[derive(Clone, PartialEq, Debug)]
pub struct NodeConfig {
    pub address: MacAddress,

    pub interface_id: u32,

    /// Line rate in bits per second, shared by every layer
    pub bitrate: u64,

    pub full_duplex: bool,

    pub promiscuous: bool,

    pub fcs_mode: FcsMode,

    pub max_attempts: u32,

    pub plca: PlcaMode,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: MacAddress::local(1),
            interface_id: 0,
            bitrate: 100_000_000,
            full_duplex: false,
            promiscuous: false,
            fcs_mode: FcsMode::DeclaredCorrect,
            max_attempts: MAX_ATTEMPTS,
            plca: PlcaMode::Disabled,
        }
    }
}

impl NodeConfig {
    pub fn new(address: MacAddress) -> Self {
        Self { address, ..Default::default() }
    }

    /// Check the per layer configurations derived from this one
    pub fn validate(&self) -> Result<(), Error> {
        self.mac().validate()?;
        self.phy().validate()
    }

    pub fn mac(&self) -> MacConfig {
        MacConfig {
            address: self.address,
            interface_id: self.interface_id,
            full_duplex: self.full_duplex,
            promiscuous: self.promiscuous,
            fcs_mode: self.fcs_mode,
            bitrate: self.bitrate,
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }

    pub fn phy(&self) -> PhyConfig {
        PhyConfig {
            bitrate: self.bitrate,
            full_duplex: self.full_duplex,
            ..Default::default()
        }
    }

    fn build_plca(&self) -> Result<Option<Plca>, Error> {
        if self.full_duplex && self.plca != PlcaMode::Disabled {
            return Err(Error::InvalidConfig("plca requires a half duplex link"));
        }

        let plca = match &self.plca {
            PlcaMode::Disabled => None,
            PlcaMode::Clause148(c) => {
                let c = PlcaConfig { bitrate: self.bitrate, ..c.clone() };
                Some(Plca::Clause148(PlcaCoordinator::new(c)?))
            },
            PlcaMode::RoundRobin(c) => {
                let c = RoundRobinConfig { bitrate: self.bitrate, ..c.clone() };
                Some(Plca::RoundRobin(RoundRobinPlca::new(c)?))
            },
        };

        Ok(plca)
    }
}

/// Notification between the layers of a node, queued so each layer
/// completes its transition before the next one reacts
#[derive(Debug)]
enum Message {
    /// MAC request, to the PLCA layer when present
    FromMac(PhyRequest),
    /// PHY indication, to the PLCA layer when present
    FromPhy(PhyIndication),
    /// PLCA indication to the MAC
    ToMac(PhyIndication),
    /// PLCA request to the PHY
    ToPhy(PhyRequest),
}

/// Network interface, generic over the backoff RNG (R) and transmit queue (Q)
pub struct Node<R, Q> {
    pub(crate) config: NodeConfig,

    pub(crate) mac: CsmaMac<R>,
    pub(crate) plca: Option<Plca>,
    pub(crate) phy: CsmaPhy,

    pub(crate) queue: Q,
    pub(crate) up: bool,

    pending: VecDeque<Message>,
}

impl <R: RngCore, Q: TxQueue> Node<R, Q> {
    pub fn new(config: NodeConfig, rng: R, queue: Q) -> Result<Self, Error> {
        config.validate()?;
        let plca = config.build_plca()?;

        Ok(Self {
            mac: CsmaMac::new(config.mac(), rng),
            phy: CsmaPhy::new(config.phy()),
            plca,
            queue,
            up: true,
            pending: VecDeque::new(),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn mac(&self) -> &CsmaMac<R> {
        &self.mac
    }

    pub fn phy(&self) -> &CsmaPhy {
        &self.phy
    }

    pub fn plca(&self) -> Option<&Plca> {
        self.plca.as_ref()
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Administratively enable or disable the interface
    pub fn set_interface_up(&mut self, up: bool) {
        debug!("Interface {} {}", self.config.address, if up { "up" } else { "down" });
        self.up = up;
    }

    /// Bring up the PLCA layer once every node is attached to the medium
    pub fn start<H: Host>(&mut self, host: &mut H) -> Result<(), Error> {
        if let Some(plca) = self.plca.as_mut() {
            plca.start(&mut PlcaCtx { host, pending: &mut self.pending })?;
        }
        self.drain(host)
    }

    /// The transmit queue has frames
    pub fn handle_can_dequeue<H: Host>(&mut self, host: &mut H) -> Result<(), Error> {
        if !self.up {
            while self.queue.can_dequeue() {
                let frame = self.queue.dequeue()?;
                debug!("Interface down, dropping frame to {}", frame.header.destination);
                host.observe(TelemetryEvent::PacketDropped(PacketDrop::new(DropReason::InterfaceDown, frame)));
            }
            return Ok(());
        }

        let mut ctx = MacCtx { host, queue: &mut self.queue, pending: &mut self.pending, up: self.up };
        self.mac.handle_can_dequeue(&mut ctx)?;

        self.drain(host)
    }

    /// Signal arriving from the medium
    pub fn handle_signal<H: Host>(&mut self, signal: Signal, host: &mut H) -> Result<(), Error> {
        // Receptions started while up still follow their updates
        let in_progress = signal.is_update && self.phy.is_tracking(signal.transmission_id);

        if !self.up && signal.kind == SignalKind::Data && !in_progress {
            match (signal.is_update, signal.decapsulate()) {
                (false, Some(frame)) => {
                    debug!("Interface down, dropping frame from {}", frame.header.source);
                    host.observe(TelemetryEvent::PacketDropped(PacketDrop::new(DropReason::InterfaceDown, frame)));
                },
                _ => debug!("Interface down, ignoring update for {:?}", signal.transmission_id),
            }
            return Ok(());
        }

        self.phy.handle_signal(signal, &mut PhyCtx { host, pending: &mut self.pending })?;
        self.drain(host)
    }

    pub fn handle_timer<H: Host>(&mut self, timer: TimerId, host: &mut H) -> Result<(), Error> {
        trace!("Node {} timer {:?} at {}", self.config.address, timer, host.now());

        match timer {
            TimerId::Mac(t) => {
                let mut ctx = MacCtx { host, queue: &mut self.queue, pending: &mut self.pending, up: self.up };
                self.mac.handle_timer(t, &mut ctx)?;
            },
            TimerId::Phy(t) => {
                self.phy.handle_timer(t, &mut PhyCtx { host, pending: &mut self.pending })?;
            },
            TimerId::Plca(t) => match self.plca.as_mut() {
                Some(plca) => plca.handle_timer(t, &mut PlcaCtx { host, pending: &mut self.pending })?,
                None => return Err(Error::InconsistentState("plca timer without plca layer")),
            },
        }

        self.drain(host)
    }

    /// Deliver queued notifications in order until none remain
    fn drain<H: Host>(&mut self, host: &mut H) -> Result<(), Error> {
        while let Some(m) = self.pending.pop_front() {
            let r = self.dispatch(m, host);
            if let Err(e) = &r {
                error!("Node {} failed at {}: {}", self.config.address, host.now(), e);
            }
            r?;
        }
        Ok(())
    }

    fn dispatch<H: Host>(&mut self, m: Message, host: &mut H) -> Result<(), Error> {
        let pending = &mut self.pending;

        match (m, self.plca.as_mut()) {
            (Message::FromMac(req), Some(plca)) => plca.handle_request(req, &mut PlcaCtx { host, pending }),
            (Message::FromPhy(ind), Some(plca)) => plca.handle_indication(ind, &mut PlcaCtx { host, pending }),
            (Message::FromMac(req), None) | (Message::ToPhy(req), _) => {
                self.phy.handle_request(req, &mut PhyCtx { host, pending })
            },
            (Message::FromPhy(ind), None) | (Message::ToMac(ind), _) => {
                let mut ctx = MacCtx { host, queue: &mut self.queue, pending, up: self.up };
                self.mac.handle_indication(ind, &mut ctx)
            },
        }
    }
}

struct MacCtx<'a, H, Q> {
    host: &'a mut H,
    queue: &'a mut Q,
    pending: &'a mut VecDeque<Message>,
    up: bool,
}

impl <'a, H: Host, Q> Scheduler<MacTimer> for MacCtx<'a, H, Q> {
    fn now(&self) -> SimTime {
        self.host.now()
    }

    fn schedule_after(&mut self, delay: SimTime, timer: MacTimer) {
        self.host.schedule_after(delay, TimerId::Mac(timer))
    }

    fn cancel(&mut self, timer: MacTimer) {
        self.host.cancel(TimerId::Mac(timer))
    }
}

impl <'a, H: Host, Q> Observer for MacCtx<'a, H, Q> {
    fn observe(&mut self, event: TelemetryEvent) {
        self.host.observe(event)
    }
}

impl <'a, H: Host, Q: TxQueue> MacContext for MacCtx<'a, H, Q> {
    fn phy(&mut self, request: PhyRequest) {
        self.pending.push_back(Message::FromMac(request));
    }

    fn can_dequeue(&self) -> bool {
        self.up && self.queue.can_dequeue()
    }

    fn dequeue(&mut self) -> Result<Frame, Error> {
        self.queue.dequeue()
    }

    fn deliver(&mut self, delivery: Delivery) {
        self.host.deliver(delivery)
    }
}

struct PhyCtx<'a, H> {
    host: &'a mut H,
    pending: &'a mut VecDeque<Message>,
}

impl <'a, H: Host> Scheduler<PhyTimer> for PhyCtx<'a, H> {
    fn now(&self) -> SimTime {
        self.host.now()
    }

    fn schedule_after(&mut self, delay: SimTime, timer: PhyTimer) {
        self.host.schedule_after(delay, TimerId::Phy(timer))
    }

    fn cancel(&mut self, timer: PhyTimer) {
        self.host.cancel(TimerId::Phy(timer))
    }
}

impl <'a, H: Host> Observer for PhyCtx<'a, H> {
    fn observe(&mut self, event: TelemetryEvent) {
        self.host.observe(event)
    }
}

impl <'a, H: Host> PhyContext for PhyCtx<'a, H> {
    fn send_signal(&mut self, signal: Signal) -> TransmissionId {
        self.host.send_signal(signal)
    }

    fn indicate(&mut self, indication: PhyIndication) {
        self.pending.push_back(Message::FromPhy(indication));
    }
}

struct PlcaCtx<'a, H> {
    host: &'a mut H,
    pending: &'a mut VecDeque<Message>,
}

impl <'a, H: Host> Scheduler<PlcaTimer> for PlcaCtx<'a, H> {
    fn now(&self) -> SimTime {
        self.host.now()
    }

    fn schedule_after(&mut self, delay: SimTime, timer: PlcaTimer) {
        self.host.schedule_after(delay, TimerId::Plca(timer))
    }

    fn cancel(&mut self, timer: PlcaTimer) {
        self.host.cancel(TimerId::Plca(timer))
    }
}

impl <'a, H: Host> Observer for PlcaCtx<'a, H> {
    fn observe(&mut self, event: TelemetryEvent) {
        self.host.observe(event)
    }
}

impl <'a, H: Host> PlcaContext for PlcaCtx<'a, H> {
    fn mac(&mut self, indication: PhyIndication) {
        self.pending.push_back(Message::ToMac(indication));
    }

    fn phy(&mut self, request: PhyRequest) {
        self.pending.push_back(Message::ToPhy(request));
    }
}

//! Physical Layer Collision Avoidance (PLCA) reconciliation sublayer
//!
//! PLCA sits between the MAC and the PHY, passing a transmit opportunity
//! around the nodes of a multidrop segment. Node 0 marks each cycle with a
//! beacon, a node holding a frame announces its turn with a commit signal and
//! every other node holds its MAC off through a virtual carrier sense.
//!
//! Two variants are provided, the [`PlcaCoordinator`] built from the control,
//! data and status state machines of clause 148, and the reduced
//! [`RoundRobinPlca`] driven only by turn timeouts.

use crate::error::Error;
use crate::phy::{PhyIndication, PhyRequest};
use crate::telemetry::Observer;
use crate::timer::{PlcaTimer, Scheduler};

pub mod coordinator;
pub use coordinator::PlcaCoordinator;

pub mod control;
pub use control::ControlState;

pub mod data;
pub use data::DataState;

pub mod status;
pub use status::StatusState;

pub mod round_robin;
pub use round_robin::RoundRobinPlca;

/// Node id that disables PLCA
pub const DISABLED_NODE_ID: u8 = 255;

/// Transmit opportunity timeout in bit times
pub const TO_TIMER_BITS: u64 = 32;

/// Wait for the next burst frame in bit times
pub const BURST_TIMER_BITS: u64 = 128;

/// Local delay line in bit times
pub const DELAY_LINE_BITS: u64 = 20;

pub const BEACON_TIMER_BITS: u64 = 20;

pub const BEACON_DETECT_TIMER_BITS: u64 = 22;

pub const INVALID_BEACON_TIMER_BITS: u64 = 4000;

pub const PENDING_TIMER_BITS: u64 = 512;

pub const COMMIT_TIMER_BITS: u64 = 288;

pub const HYSTERESIS_TIMER_BITS: u64 = 130_090;

/// Local jam for a frame held in the delay line
pub const LOCAL_JAM_BITS: u64 = 32;

/// Control signal last sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    None,
    Beacon,
    Commit,
}

/// Clause 148 PLCA configuration
#[derive(Clone, PartialEq, Debug)]
pub struct PlcaConfig {
    pub enabled: bool,

    /// Nodes in the cycle, only used by node 0
    pub node_count: u16,

    /// Local node id, 0 sends beacons
    pub local_id: u8,

    /// Additional frames sent per transmit opportunity
    pub max_burst_count: u32,

    /// Line rate in bits per second
    pub bitrate: u64,

    pub to_bits: u64,
    pub burst_bits: u64,
    pub delay_line_bits: u64,
    pub beacon_bits: u64,
    pub beacon_detect_bits: u64,
    pub invalid_beacon_bits: u64,
    pub pending_bits: u64,
    pub commit_bits: u64,
    pub hysteresis_bits: u64,
}

impl Default for PlcaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_count: 8,
            local_id: 0,
            max_burst_count: 0,
            bitrate: 100_000_000,
            to_bits: TO_TIMER_BITS,
            burst_bits: BURST_TIMER_BITS,
            delay_line_bits: DELAY_LINE_BITS,
            beacon_bits: BEACON_TIMER_BITS,
            beacon_detect_bits: BEACON_DETECT_TIMER_BITS,
            invalid_beacon_bits: INVALID_BEACON_TIMER_BITS,
            pending_bits: PENDING_TIMER_BITS,
            commit_bits: COMMIT_TIMER_BITS,
            hysteresis_bits: HYSTERESIS_TIMER_BITS,
        }
    }
}

impl PlcaConfig {
    pub fn new(local_id: u8, node_count: u16) -> Self {
        Self { local_id, node_count, ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.node_count == 0 || self.node_count > 255 {
            return Err(Error::InvalidConfig("plca node count must be in 1..=255"));
        }
        if self.local_id != DISABLED_NODE_ID && self.local_id as u16 >= self.node_count {
            return Err(Error::InvalidConfig("plca local id must be below the node count"));
        }
        if self.to_bits == 0 || self.bitrate == 0 {
            return Err(Error::InvalidConfig("plca timers require a bit rate and timeout"));
        }
        Ok(())
    }
}

/// Round robin PLCA configuration
#[derive(Clone, PartialEq, Debug)]
pub struct RoundRobinConfig {
    pub node_count: u8,

    pub local_id: u8,

    pub bitrate: u64,

    /// Turn length in bit times, must exceed the inter frame gap
    pub to_bits: u64,
}

impl Default for RoundRobinConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            local_id: 0,
            bitrate: 100_000_000,
            to_bits: 200,
        }
    }
}

impl RoundRobinConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_count == 0 || self.local_id >= self.node_count {
            return Err(Error::InvalidConfig("round robin local id must be below the node count"));
        }
        if self.to_bits == 0 || self.bitrate == 0 {
            return Err(Error::InvalidConfig("round robin turns require a bit rate and timeout"));
        }
        Ok(())
    }
}

/// Collaborators of the PLCA layer
pub trait PlcaContext: Scheduler<PlcaTimer> + Observer {
    /// Notify the MAC above
    fn mac(&mut self, indication: PhyIndication);

    /// Issue a request to the PHY below
    fn phy(&mut self, request: PhyRequest);
}

/// PLCA variant between a node's MAC and PHY
#[derive(Debug)]
pub enum Plca {
    Clause148(PlcaCoordinator),
    RoundRobin(RoundRobinPlca),
}

impl Plca {
    /// Evaluate the initial state, called once the node is wired up
    pub fn start<C: PlcaContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        match self {
            Plca::Clause148(p) => p.start(ctx),
            Plca::RoundRobin(p) => p.start(ctx),
        }
    }

    /// Request from the MAC
    pub fn handle_request<C: PlcaContext>(&mut self, request: PhyRequest, ctx: &mut C) -> Result<(), Error> {
        match self {
            Plca::Clause148(p) => p.handle_request(request, ctx),
            Plca::RoundRobin(p) => p.handle_request(request, ctx),
        }
    }

    /// Indication from the PHY
    pub fn handle_indication<C: PlcaContext>(&mut self, indication: PhyIndication, ctx: &mut C) -> Result<(), Error> {
        match self {
            Plca::Clause148(p) => p.handle_indication(indication, ctx),
            Plca::RoundRobin(p) => p.handle_indication(indication, ctx),
        }
    }

    pub fn handle_timer<C: PlcaContext>(&mut self, timer: PlcaTimer, ctx: &mut C) -> Result<(), Error> {
        match self {
            Plca::Clause148(p) => p.handle_timer(timer, ctx),
            Plca::RoundRobin(p) => p.handle_timer(timer, ctx),
        }
    }
}

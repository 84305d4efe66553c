//! Medium Access Control (MAC) layer module.
//! Contains the CSMA/CD MAC and its collaborators.

use crate::error::Error;
use crate::frame::{Frame, MacAddress};
use crate::phy::PhyRequest;
use crate::telemetry::Observer;
use crate::timer::{MacTimer, Scheduler};

pub mod config;
pub use config::{MacConfig, MAX_ATTEMPTS};

pub mod backoff;
pub use backoff::BackoffScheduler;

pub mod filter;
pub use filter::AddressFilter;

pub mod queue;
pub use queue::{FifoQueue, TxQueue};

pub mod csma;
pub use csma::{CsmaMac, MacEvent, MacState};

/// Frame handed to the upper layer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub frame: Frame,
    pub source: MacAddress,
    pub destination: MacAddress,
    pub interface_id: u32,
}

/// Collaborators of the MAC
pub trait MacContext: Scheduler<MacTimer> + Observer {
    /// Issue a request to the layer below
    fn phy(&mut self, request: PhyRequest);

    /// Transmit queue has a frame available
    fn can_dequeue(&self) -> bool;

    /// Take the next frame from the transmit queue
    fn dequeue(&mut self) -> Result<Frame, Error>;

    /// Hand a received frame to the upper layer
    fn deliver(&mut self, delivery: Delivery);
}

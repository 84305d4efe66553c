//! Physical layer signalling
//!
//! Requests and indications exchanged with the layer above (the MAC, or the
//! PLCA reconciliation sublayer sitting between MAC and PHY) mirror the
//! media independent interface.

use crate::error::Error;
use crate::frame::Frame;
use crate::telemetry::Observer;
use crate::timer::{PhyTimer, Scheduler};

pub mod signal;
pub use signal::{Signal, SignalKind, TransmissionId};

pub mod csma;
pub use csma::{CsmaPhy, PhyState};

/// Jam length in bit times
pub const JAM_SIGNAL_BITS: u64 = 32;

/// PLCA beacon length in bit times
pub const BEACON_SIGNAL_BITS: u64 = 20;

/// Upper bound on a commit that is never promoted or ended
pub const COMMIT_SIGNAL_MAX_BITS: u64 = 512;

/// Requests from the upper layer
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum PhyRequest {
    StartFrame(Frame),
    /// End the current frame early
    EndFrame,
    StartJam,
    StartBeacon,
    StartCommit,
    /// End the current beacon or commit
    EndSignal,
}

/// Indications to the upper layer
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum PhyIndication {
    CarrierSenseStart,
    CarrierSenseEnd,
    CollisionStart,
    CollisionEnd,
    TransmissionStart(SignalKind),
    TransmissionEnd(SignalKind, Option<Frame>),
    ReceptionStart(SignalKind),
    /// Completed reception, with the frame when it was received intact
    ReceptionEnd(SignalKind, Option<Frame>),
}

/// PHY configuration
#[derive(Clone, PartialEq, Debug)]
pub struct PhyConfig {
    /// Line rate in bits per second
    pub bitrate: u64,

    pub full_duplex: bool,

    pub jam_bits: u64,

    pub beacon_bits: u64,

    pub commit_max_bits: u64,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            bitrate: 100_000_000,
            full_duplex: false,
            jam_bits: JAM_SIGNAL_BITS,
            beacon_bits: BEACON_SIGNAL_BITS,
            commit_max_bits: COMMIT_SIGNAL_MAX_BITS,
        }
    }
}

impl PhyConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bitrate == 0 {
            return Err(Error::InvalidConfig("phy bit rate must be non-zero"));
        }
        if self.jam_bits == 0 {
            return Err(Error::InvalidConfig("phy jam length must be non-zero"));
        }
        Ok(())
    }
}

/// Collaborators of the PHY
pub trait PhyContext: Scheduler<PhyTimer> + Observer {
    /// Put a signal on the medium, new transmissions are assigned an id
    fn send_signal(&mut self, signal: Signal) -> TransmissionId;

    /// Notify the upper layer
    fn indicate(&mut self, indication: PhyIndication);
}

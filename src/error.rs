use core::fmt;

use crate::frame::{Frame, MacAddress};
use crate::phy::SignalKind;

/// Fatal errors, these abort the simulation run
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Outbound frame is addressed to the transmitting interface
    DestinationIsLocal(MacAddress),

    /// Outbound frame exceeds the configured maximum frame size
    FrameTooLarge { length: usize, max: usize },

    /// Event has no transition in the current state
    UnhandledEvent { machine: &'static str, state: &'static str, event: &'static str },

    /// Internal bookkeeping disagrees with the current state
    InconsistentState(&'static str),

    /// Signal kind not valid for the requesting layer
    UnknownSignal(SignalKind),

    /// PLCA state machines did not settle within the iteration limit
    PlcaNotSettled(usize),

    /// Half and full duplex signals on the same link
    DuplexMismatch,

    /// Jam signal received by a full duplex interface
    StrayJamSignal,

    /// Dequeue requested from an empty transmit queue
    QueueEmpty,

    /// Transmit queue is full
    QueueFull(Frame),

    /// Overlapping reception table is exhausted
    TooManySignals,

    /// Buffer too short to decode a frame
    BufferTooShort(usize),

    /// Invalid configuration parameter
    InvalidConfig(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DestinationIsLocal(a) => write!(f, "frame destination {} is the local interface", a),
            Error::FrameTooLarge { length, max } => write!(f, "frame length {} exceeds maximum {}", length, max),
            Error::UnhandledEvent { machine, state, event } => write!(f, "{} unhandled event {} in state {}", machine, event, state),
            Error::InconsistentState(s) => write!(f, "inconsistent state: {}", s),
            Error::UnknownSignal(k) => write!(f, "unknown signal {}", k),
            Error::PlcaNotSettled(n) => write!(f, "PLCA state machines not settled after {} iterations", n),
            Error::DuplexMismatch => write!(f, "half and full duplex interfaces on the same link"),
            Error::StrayJamSignal => write!(f, "jam signal received in full duplex mode"),
            Error::QueueEmpty => write!(f, "transmit queue is empty"),
            Error::QueueFull(_) => write!(f, "transmit queue is full"),
            Error::TooManySignals => write!(f, "too many overlapping signals"),
            Error::BufferTooShort(n) => write!(f, "buffer too short ({} bytes)", n),
            Error::InvalidConfig(s) => write!(f, "invalid configuration: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Reasons a frame is discarded without aborting the run
#[derive(Debug, Clone, Copy, PartialEq, strum::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    RetryLimitReached,
    NotAddressedToUs,
    IncorrectlyReceived,
    InterfaceDown,
}

/// Details of a dropped frame
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDrop {
    pub reason: DropReason,
    /// Limit that was exceeded, for [`DropReason::RetryLimitReached`]
    pub limit: Option<u32>,
    pub frame: Frame,
}

impl PacketDrop {
    pub fn new(reason: DropReason, frame: Frame) -> Self {
        Self { reason, limit: None, frame }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}


use crate::error::Error;
use crate::frame::{FcsMode, MacAddress, MAX_ETHERNET_FRAME_BYTES, MIN_ETHERNET_FRAME_BYTES};

/// Inter frame gap in bit times
pub const INTER_FRAME_GAP_BITS: u64 = 96;

/// Backoff slot in bit times
pub const SLOT_TIME_BITS: u64 = 512;

/// Maximum transmission attempts before a frame is dropped
pub const MAX_ATTEMPTS: u32 = 16;

/// Retry count at which the backoff range stops growing
pub const BACKOFF_RANGE_LIMIT: u32 = 10;

/// Configuration for the CSMA/CD MAC
#[derive(Clone, PartialEq, Debug)]
pub struct MacConfig {
    /// Local interface address
    pub address: MacAddress,

    /// Interface identifier attached to delivered frames
    pub interface_id: u32,

    /// Full duplex operation, disables carrier sense and collision handling
    pub full_duplex: bool,

    /// Accept multicast frames for any group
    pub promiscuous: bool,

    /// FCS applied to outbound frames
    pub fcs_mode: FcsMode,

    /// Line rate in bits per second
    pub bitrate: u64,

    /// Minimum frame length in bytes, shorter frames are padded
    pub min_frame_bytes: usize,

    /// Maximum frame length in bytes
    pub max_frame_bytes: usize,

    /// Transmission attempts before dropping a frame
    pub max_attempts: u32,

    /// Retry count capping the backoff range
    pub backoff_range_limit: u32,

    pub slot_time_bits: u64,

    pub inter_frame_gap_bits: u64,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            address: MacAddress::local(1),
            interface_id: 0,
            full_duplex: false,
            promiscuous: false,
            fcs_mode: FcsMode::DeclaredCorrect,
            bitrate: 100_000_000,
            min_frame_bytes: MIN_ETHERNET_FRAME_BYTES,
            max_frame_bytes: MAX_ETHERNET_FRAME_BYTES,
            max_attempts: MAX_ATTEMPTS,
            backoff_range_limit: BACKOFF_RANGE_LIMIT,
            slot_time_bits: SLOT_TIME_BITS,
            inter_frame_gap_bits: INTER_FRAME_GAP_BITS,
        }
    }
}

impl MacConfig {
    pub fn new(address: MacAddress) -> Self {
        Self { address, ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.bitrate == 0 {
            return Err(Error::InvalidConfig("mac bit rate must be non-zero"));
        }
        if self.min_frame_bytes > self.max_frame_bytes {
            return Err(Error::InvalidConfig("mac minimum frame length exceeds the maximum"));
        }
        if self.slot_time_bits == 0 {
            return Err(Error::InvalidConfig("mac slot time must be non-zero"));
        }
        Ok(())
    }
}

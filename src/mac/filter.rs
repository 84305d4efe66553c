//! Destination address filtering for received frames

use crate::frame::{Frame, MacAddress};

/// Receive address filter
#[derive(Clone, PartialEq, Debug)]
pub struct AddressFilter {
    address: MacAddress,
    promiscuous: bool,
}

impl AddressFilter {
    pub fn new(address: MacAddress, promiscuous: bool) -> Self {
        Self { address, promiscuous }
    }

    /// Check whether a received frame should be discarded.
    ///
    /// Frames to the local address and broadcast are always accepted. PAUSE
    /// frames are only accepted on the reserved PAUSE multicast address, other
    /// multicast frames when promiscuous or addressed to a group.
    pub fn is_frame_not_for_us(&self, frame: &Frame) -> bool {
        let dest = frame.header.destination;

        if dest == self.address || dest.is_broadcast() {
            return false;
        }

        if frame.is_pause() {
            return dest != MacAddress::MULTICAST_PAUSE;
        }

        !(self.promiscuous || dest.is_multicast())
    }
}

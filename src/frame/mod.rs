//! Ethernet II frame model
//!
//! Frames carry an owned header, an opaque payload, a count of zero padding
//! bytes and an optional FCS. On-wire lengths include padding and FCS.

use bytes::{BufMut, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::Error;

pub mod address;
pub use address::MacAddress;

pub mod fcs;
pub use fcs::{Fcs, FcsMode};

/// Destination, source and type/length
pub const HEADER_LENGTH: usize = 14;

/// Frame check sequence length
pub const FCS_LENGTH: usize = 4;

/// Minimum frame length including FCS
pub const MIN_ETHERNET_FRAME_BYTES: usize = 64;

/// Maximum untagged frame length including FCS
pub const MAX_ETHERNET_FRAME_BYTES: usize = 1518;

/// Preamble and start frame delimiter
pub const PHY_HEADER_LENGTH: usize = 8;

/// Ethertype of 802.3x MAC control (PAUSE) frames
pub const ETHERTYPE_FLOW_CONTROL: u16 = 0x8808;

/// Ethernet MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub type_or_length: u16,
}

impl EthernetHeader {
    pub fn new(destination: MacAddress, source: MacAddress, type_or_length: u16) -> Self {
        Self { destination, source, type_or_length }
    }

    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0..6].copy_from_slice(&self.destination.0);
        buf[6..12].copy_from_slice(&self.source.0);
        BigEndian::write_u16(&mut buf[12..14], self.type_or_length);
        HEADER_LENGTH
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::BufferTooShort(buf.len()));
        }

        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&buf[0..6]);
        source.copy_from_slice(&buf[6..12]);

        Ok(Self {
            destination: MacAddress(destination),
            source: MacAddress(source),
            type_or_length: BigEndian::read_u16(&buf[12..14]),
        })
    }
}

/// Ethernet frame with owned payload
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: EthernetHeader,
    payload: Bytes,
    padding: usize,
    fcs: Option<Fcs>,
    bit_error: bool,
}

impl Frame {
    pub fn new(header: EthernetHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
            padding: 0,
            fcs: None,
            bit_error: false,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn fcs(&self) -> Option<Fcs> {
        self.fcs
    }

    /// Frame was damaged on the wire
    pub fn has_bit_error(&self) -> bool {
        self.bit_error
    }

    pub fn set_bit_error(&mut self) {
        self.bit_error = true;
    }

    /// PAUSE frames use the MAC control ethertype
    pub fn is_pause(&self) -> bool {
        self.header.type_or_length == ETHERTYPE_FLOW_CONTROL
    }

    /// Header, payload and padding length in bytes
    pub fn data_length(&self) -> usize {
        HEADER_LENGTH + self.payload.len() + self.padding
    }

    /// On-wire frame length in bytes, the FCS is always counted
    pub fn byte_length(&self) -> usize {
        self.data_length() + FCS_LENGTH
    }

    pub fn bit_length(&self) -> u64 {
        self.byte_length() as u64 * 8
    }

    pub(crate) fn add_padding(&mut self, n: usize) {
        self.padding += n;
    }

    pub(crate) fn clear_fcs(&mut self) {
        self.fcs = None;
    }

    pub(crate) fn set_fcs(&mut self, fcs: Fcs) {
        self.fcs = Some(fcs);
    }

    /// Cut the frame to `length` on-wire bytes, marking it damaged.
    ///
    /// The FCS is invalidated, padding and then payload are removed and
    /// the header is kept.
    pub fn truncate(&mut self, length: usize) {
        if length >= self.byte_length() {
            return;
        }
        self.bit_error = true;
        self.fcs = None;

        let mut excess = self.byte_length() - length;

        let p = excess.min(self.padding);
        self.padding -= p;
        excess -= p;

        let keep = self.payload.len().saturating_sub(excess);
        self.payload.truncate(keep);
    }

    /// Serialise header, payload and padding
    pub fn encode_data(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.byte_length());

        let mut header = [0u8; HEADER_LENGTH];
        self.header.encode(&mut header);

        buf.put_slice(&header);
        buf.put_slice(&self.payload);
        buf.resize(buf.len() + self.padding, 0);

        buf
    }

    /// Serialise the complete frame, a missing FCS is written as zeros
    pub fn encode(&self) -> BytesMut {
        let mut buf = self.encode_data();

        let mut fcs = [0u8; FCS_LENGTH];
        LittleEndian::write_u32(&mut fcs, self.fcs.map(|f| f.value).unwrap_or(0));
        buf.put_slice(&fcs);

        buf
    }

    /// Parse a complete frame, padding is not distinguished from payload
    pub fn decode(buf: &[u8], fcs_mode: FcsMode) -> Result<Self, Error> {
        if buf.len() < HEADER_LENGTH + FCS_LENGTH {
            return Err(Error::BufferTooShort(buf.len()));
        }

        let header = EthernetHeader::decode(buf)?;
        let fcs_offset = buf.len() - FCS_LENGTH;

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&buf[HEADER_LENGTH..fcs_offset]),
            padding: 0,
            fcs: Some(Fcs { mode: fcs_mode, value: LittleEndian::read_u32(&buf[fcs_offset..]) }),
            bit_error: false,
        })
    }
}

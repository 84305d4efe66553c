//! Signals on the shared medium

use crate::frame::{Frame, PHY_HEADER_LENGTH};
use crate::timer::{bits_to_time, time_to_bits, SimTime};

/// What a signal carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalKind {
    /// Ethernet frame with PHY header
    Data,
    /// Collision enforcement
    Jam,
    /// PLCA cycle start
    Beacon,
    /// PLCA transmit opportunity claim
    Commit,
}

impl SignalKind {
    /// Beacon and commit signals belong to the PLCA layer
    pub fn is_plca(&self) -> bool {
        matches!(self, SignalKind::Beacon | SignalKind::Commit)
    }
}

/// Identity shared by a transmission and all of its updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmissionId(pub u64);

/// A transmission, or an update to one, as seen on the medium
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub frame: Option<Frame>,
    pub bit_length: u64,
    pub bitrate: u64,
    pub duration: SimTime,
    /// Start of the transmission at the sender
    pub start: SimTime,
    /// Time this copy was put on the medium
    pub sent_at: SimTime,
    pub transmission_id: TransmissionId,
    /// Replaces an earlier signal with the same transmission id
    pub is_update: bool,
    pub full_duplex: bool,
    pub bit_error: bool,
}

impl Signal {
    fn new(kind: SignalKind, frame: Option<Frame>, bit_length: u64, bitrate: u64, now: SimTime) -> Self {
        Self {
            kind,
            frame,
            bit_length,
            bitrate,
            duration: bits_to_time(bit_length, bitrate),
            start: now,
            sent_at: now,
            transmission_id: TransmissionId::default(),
            is_update: false,
            full_duplex: false,
            bit_error: false,
        }
    }

    /// Encapsulate a frame, the preamble and SFD are added to its length
    pub fn data(frame: Frame, bitrate: u64, now: SimTime) -> Self {
        let bits = (frame.byte_length() + PHY_HEADER_LENGTH) as u64 * 8;
        Self::new(SignalKind::Data, Some(frame), bits, bitrate, now)
    }

    /// Jam, beacon or commit signal of `bits` bit times
    pub fn control(kind: SignalKind, bits: u64, bitrate: u64, now: SimTime) -> Self {
        Self::new(kind, None, bits, bitrate, now)
    }

    pub fn end_time(&self) -> SimTime {
        self.start + self.duration
    }

    /// Duration left when this copy was put on the medium
    pub fn remaining(&self) -> SimTime {
        self.end_time().saturating_sub(self.sent_at)
    }

    /// Shorten the signal to `duration` after its start.
    ///
    /// Returns true if the signal was shortened, truncated frames are
    /// marked as damaged.
    pub fn cut(&mut self, duration: SimTime) -> bool {
        if duration >= self.duration {
            return false;
        }

        self.duration = duration;
        self.bit_length = time_to_bits(duration, self.bitrate);
        self.bit_error = true;

        if let Some(f) = self.frame.as_mut() {
            let bytes = (self.bit_length / 8) as usize;
            f.truncate(bytes.saturating_sub(PHY_HEADER_LENGTH));
        }

        true
    }

    /// Replace the carried frame, keeping start and identity.
    ///
    /// Used to turn a commit in flight into the data transmission it
    /// was claiming the medium for.
    pub fn promote(&mut self, frame: Frame, now: SimTime) {
        let bits = (frame.byte_length() + PHY_HEADER_LENGTH) as u64 * 8;
        let elapsed = now.saturating_sub(self.start);

        self.kind = SignalKind::Data;
        self.frame = Some(frame);
        self.bit_length = time_to_bits(elapsed, self.bitrate) + bits;
        self.duration = elapsed + bits_to_time(bits, self.bitrate);
    }

    /// Frame carried by a data signal, with bit errors applied
    pub fn decapsulate(&self) -> Option<Frame> {
        let mut frame = self.frame.clone()?;
        if self.bit_error {
            frame.set_bit_error();
        }
        Some(frame)
    }
}

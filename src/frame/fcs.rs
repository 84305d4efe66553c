//! Ethernet frame check sequence and minimum length padding

use log::trace;

use super::{Frame, FCS_LENGTH};

/// FCS value carried by frames declared correct without computing a CRC
pub const FCS_DECLARED_CORRECT: u32 = 0xC00D_C00D;

/// FCS value carried by frames declared incorrect
pub const FCS_DECLARED_INCORRECT: u32 = 0xBAAD_BAAD;

/// How the FCS of outbound frames is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[strum(serialize_all = "kebab-case")]
pub enum FcsMode {
    DeclaredCorrect,
    DeclaredIncorrect,
    Computed,
}

impl Default for FcsMode {
    fn default() -> Self {
        FcsMode::DeclaredCorrect
    }
}

/// Frame check sequence attached to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fcs {
    pub mode: FcsMode,
    pub value: u32,
}

/// CRC-32 (IEEE 802.3 polynomial) over the serialised frame without its FCS
pub fn compute_fcs(frame: &Frame) -> u32 {
    crc32fast::hash(&frame.encode_data())
}

/// Replace the FCS placeholder, pad the frame to `min_frame_bytes` and
/// attach an FCS produced per `mode`.
///
/// Padding is inserted between the payload and the FCS.
pub fn add_padding_and_set_fcs(frame: &mut Frame, min_frame_bytes: usize, mode: FcsMode) {
    frame.clear_fcs();

    let current = frame.data_length();
    let padding = min_frame_bytes.saturating_sub(FCS_LENGTH + current);
    if padding > 0 {
        trace!("Padding frame by {} bytes", padding);
        frame.add_padding(padding);
    }

    let value = match mode {
        FcsMode::DeclaredCorrect => FCS_DECLARED_CORRECT,
        FcsMode::DeclaredIncorrect => FCS_DECLARED_INCORRECT,
        FcsMode::Computed => compute_fcs(frame),
    };

    frame.set_fcs(Fcs { mode, value });
}

/// Check the FCS of a received frame
pub fn verify_fcs(frame: &Frame) -> bool {
    match frame.fcs() {
        Some(Fcs { mode: FcsMode::DeclaredCorrect, .. }) => true,
        Some(Fcs { mode: FcsMode::DeclaredIncorrect, .. }) => false,
        Some(Fcs { mode: FcsMode::Computed, value }) => compute_fcs(frame) == value,
        None => false,
    }
}

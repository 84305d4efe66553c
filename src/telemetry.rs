//! Telemetry events emitted by the MAC, PHY and PLCA layers

use crate::error::PacketDrop;
use crate::mac::MacState;
use crate::phy::{PhyState, SignalKind, TransmissionId};
use crate::plca::{ControlState, DataState, StatusState};
use crate::timer::SimTime;

/// Observable occurrences, reported through an [`Observer`]
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    MacStateChanged { from: MacState, to: MacState },

    PhyStateChanged { from: PhyState, to: PhyState },

    /// PLCA state machines settled in a new combination
    PlcaStateChanged { control: ControlState, data: DataState, status: StatusState },

    /// PLCA transmit opportunity counter changed
    PlcaCurrentId(u16),

    /// Physical collision detected by the PHY
    Collision,

    BackoffStarted { retries: u32, range: u32, slot: u32, delay: SimTime },

    TransmissionStarted { kind: SignalKind, id: TransmissionId },

    /// Outbound signal finished, `truncated` when cut short by a jam
    TransmissionEnded { kind: SignalKind, id: TransmissionId, truncated: bool },

    ReceptionStarted { kind: SignalKind, id: TransmissionId },

    ReceptionEnded { kind: SignalKind, delivered: bool },

    PacketDropped(PacketDrop),
}

/// Sink for telemetry events
pub trait Observer {
    fn observe(&mut self, event: TelemetryEvent);
}

impl Observer for () {
    fn observe(&mut self, _event: TelemetryEvent) {}
}

impl Observer for alloc::vec::Vec<TelemetryEvent> {
    fn observe(&mut self, event: TelemetryEvent) {
        self.push(event);
    }
}

//! CSMA/PLCA crate prelude
//
// Copyright 2021 Ryan Kurte

pub use crate::error::{Error, DropReason, PacketDrop};
pub use crate::timer::{Scheduler, SimTime, TimerId, MacTimer, PhyTimer, PlcaTimer, bits_to_time};

pub use crate::frame::{Frame, EthernetHeader, MacAddress, FcsMode};

pub use crate::telemetry::{Observer, TelemetryEvent};

pub use crate::mac::{CsmaMac, MacConfig, MacState, Delivery, FifoQueue, TxQueue};
pub use crate::phy::{CsmaPhy, PhyConfig, PhyState, Signal, SignalKind, TransmissionId};
pub use crate::plca::{Plca, PlcaConfig, PlcaCoordinator, RoundRobinConfig, RoundRobinPlca};
pub use crate::plca::{ControlState, DataState, StatusState};

pub use crate::node::{Host, Node, NodeConfig, PlcaMode};

#[cfg(feature="std")]
pub use crate::sim::{Network, NetworkConfig, SimNode, Received, TraceRecord};

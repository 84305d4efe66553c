//! Ethernet CSMA/CD and PLCA for discrete-event network simulation
//!
//! Each simulated interface is a [`node::Node`] stacking a CSMA/CD MAC, an
//! optional PLCA reconciliation sublayer and a CSMA PHY. Layers are state
//! machines driven by timers and signals from a host, which the `std`
//! feature provides as the shared bus [`sim::Network`].
//
// Copyright 2021 Ryan Kurte

#![no_std]

extern crate alloc;

#[cfg(any(test, feature="std"))]
extern crate std;

pub mod error;

pub mod timer;

pub mod frame;

pub mod telemetry;

pub mod mac;

pub mod phy;

pub mod plca;

pub mod node;

#[cfg(feature="std")]
pub mod sim;

pub mod prelude;

//! Reduced round robin PLCA
//!
//! Turns advance on a fixed timeout measured from the end of the last
//! activity on the medium, node 0 restarts the cycle with a beacon once the
//! last turn expires. The MAC sees carrier whenever the medium is busy or the
//! current turn belongs to another node.

use log::{debug, trace};

use crate::error::Error;
use crate::phy::{PhyIndication, PhyRequest, SignalKind};
use crate::telemetry::TelemetryEvent;
use crate::timer::{bits_to_time, PlcaTimer};

use super::{PlcaContext, RoundRobinConfig};

#[derive(Debug)]
pub struct RoundRobinPlca {
    config: RoundRobinConfig,

    /// Current turn, `None` while waiting for a beacon
    cur_id: Option<u8>,

    phy_crs: bool,
    mac_carrier: bool,
}

impl RoundRobinPlca {
    pub fn new(config: RoundRobinConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            cur_id: None,
            phy_crs: false,
            mac_carrier: false,
        })
    }

    pub fn config(&self) -> &RoundRobinConfig {
        &self.config
    }

    pub fn cur_id(&self) -> Option<u8> {
        self.cur_id
    }

    pub fn start<C: PlcaContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        if self.is_beacon_owner() {
            self.send_beacon(ctx);
        }
        self.update_carrier(ctx);
        Ok(())
    }

    /// Request from the MAC
    pub fn handle_request<C: PlcaContext>(&mut self, request: PhyRequest, ctx: &mut C) -> Result<(), Error> {
        match request {
            PhyRequest::StartFrame(frame) => {
                ctx.cancel(PlcaTimer::TurnTimeout);
                ctx.phy(PhyRequest::StartFrame(frame));
            },
            PhyRequest::EndFrame | PhyRequest::StartJam => ctx.phy(request),
            PhyRequest::StartBeacon => return Err(Error::UnknownSignal(SignalKind::Beacon)),
            PhyRequest::StartCommit | PhyRequest::EndSignal => return Err(Error::UnknownSignal(SignalKind::Commit)),
        }
        Ok(())
    }

    /// Indication from the PHY
    pub fn handle_indication<C: PlcaContext>(&mut self, indication: PhyIndication, ctx: &mut C) -> Result<(), Error> {
        match indication {
            PhyIndication::CarrierSenseStart => {
                self.phy_crs = true;
                ctx.cancel(PlcaTimer::TurnTimeout);
            },
            PhyIndication::CarrierSenseEnd => {
                self.phy_crs = false;
                self.schedule_turn(ctx);
            },
            PhyIndication::CollisionStart | PhyIndication::CollisionEnd => ctx.mac(indication),
            PhyIndication::ReceptionStart(SignalKind::Data) => ctx.mac(indication),
            PhyIndication::ReceptionEnd(SignalKind::Beacon, _) => self.set_turn(Some(0), ctx),
            PhyIndication::ReceptionEnd(SignalKind::Data, _) => ctx.mac(indication),
            PhyIndication::TransmissionStart(kind) if !kind.is_plca() => ctx.mac(indication),
            PhyIndication::TransmissionEnd(SignalKind::Beacon, _) => {
                self.set_turn(Some(0), ctx);
                self.schedule_turn(ctx);
            },
            PhyIndication::TransmissionEnd(SignalKind::Data, _) | PhyIndication::TransmissionEnd(SignalKind::Jam, _) => {
                ctx.mac(indication);
                self.schedule_turn(ctx);
            },
            _ => (),
        }

        self.update_carrier(ctx);
        Ok(())
    }

    pub fn handle_timer<C: PlcaContext>(&mut self, timer: PlcaTimer, ctx: &mut C) -> Result<(), Error> {
        if timer != PlcaTimer::TurnTimeout {
            return Ok(());
        }

        match self.cur_id {
            Some(id) if id + 1 >= self.config.node_count => {
                trace!("Cycle complete on node {}", self.config.local_id);
                self.set_turn(None, ctx);
                if self.is_beacon_owner() {
                    self.send_beacon(ctx);
                }
            },
            Some(id) => {
                self.set_turn(Some(id + 1), ctx);
                self.schedule_turn(ctx);
            },
            None => (),
        }

        self.update_carrier(ctx);
        Ok(())
    }

    fn is_beacon_owner(&self) -> bool {
        self.config.local_id == 0
    }

    fn send_beacon<C: PlcaContext>(&mut self, ctx: &mut C) {
        debug!("Sending beacon at {}", ctx.now());
        ctx.phy(PhyRequest::StartBeacon);
    }

    fn schedule_turn<C: PlcaContext>(&mut self, ctx: &mut C) {
        if self.cur_id.is_some() {
            ctx.schedule_after(bits_to_time(self.config.to_bits, self.config.bitrate), PlcaTimer::TurnTimeout);
        }
    }

    fn set_turn<C: PlcaContext>(&mut self, id: Option<u8>, ctx: &mut C) {
        if self.cur_id == id {
            return;
        }

        self.cur_id = id;
        if let Some(id) = id {
            trace!("Node {} now at turn {}", self.config.local_id, id);
            ctx.observe(TelemetryEvent::PlcaCurrentId(id as u16));
        }
    }

    /// Report virtual carrier sense edges to the MAC
    fn update_carrier<C: PlcaContext>(&mut self, ctx: &mut C) {
        let carrier = self.phy_crs || self.cur_id != Some(self.config.local_id);

        if carrier != self.mac_carrier {
            self.mac_carrier = carrier;
            ctx.mac(match carrier {
                true => PhyIndication::CarrierSenseStart,
                false => PhyIndication::CarrierSenseEnd,
            });
        }
    }
}

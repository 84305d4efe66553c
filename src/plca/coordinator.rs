//! Clause 148 PLCA coordinator
//
// Copyright 2021 Ryan Kurte

use log::{debug, trace, warn};

use crate::error::Error;
use crate::frame::Frame;
use crate::phy::{PhyIndication, PhyRequest, SignalKind};
use crate::telemetry::TelemetryEvent;
use crate::timer::{bits_to_time, PlcaTimer};

use super::{Command, ControlState, DataState, PlcaConfig, PlcaContext, StatusState, DISABLED_NODE_ID, LOCAL_JAM_BITS};

/// State machine steps allowed per evaluation before giving up
pub const MAX_PLCA_STEPS: usize = 64;

bitflags::bitflags! {
    /// PLCA timers currently scheduled
    pub struct Armed: u16 {
        const BEACON         = 1 << 0;
        const BEACON_DETECT  = 1 << 1;
        const INVALID_BEACON = 1 << 2;
        const BURST          = 1 << 3;
        const TURN_TIMEOUT   = 1 << 4;
        const HOLD           = 1 << 5;
        const PENDING        = 1 << 6;
        const COMMIT         = 1 << 7;
        const STATUS         = 1 << 8;
        const JAM            = 1 << 9;
    }
}

const TIMERS: [PlcaTimer; 10] = [
    PlcaTimer::Beacon,
    PlcaTimer::BeaconDetect,
    PlcaTimer::InvalidBeacon,
    PlcaTimer::Burst,
    PlcaTimer::TurnTimeout,
    PlcaTimer::Hold,
    PlcaTimer::Pending,
    PlcaTimer::Commit,
    PlcaTimer::Status,
    PlcaTimer::Jam,
];

impl From<PlcaTimer> for Armed {
    fn from(t: PlcaTimer) -> Self {
        match t {
            PlcaTimer::Beacon => Armed::BEACON,
            PlcaTimer::BeaconDetect => Armed::BEACON_DETECT,
            PlcaTimer::InvalidBeacon => Armed::INVALID_BEACON,
            PlcaTimer::Burst => Armed::BURST,
            PlcaTimer::TurnTimeout => Armed::TURN_TIMEOUT,
            PlcaTimer::Hold => Armed::HOLD,
            PlcaTimer::Pending => Armed::PENDING,
            PlcaTimer::Commit => Armed::COMMIT,
            PlcaTimer::Status => Armed::STATUS,
            PlcaTimer::Jam => Armed::JAM,
        }
    }
}

/// PLCA coordinator, evaluates the control, data and status state machines
/// to a fixed point on every input and reports carrier and collision edges
/// to the MAC.
#[derive(Debug)]
pub struct PlcaCoordinator {
    pub(super) config: PlcaConfig,

    pub(super) control: ControlState,
    pub(super) data: DataState,
    pub(super) status: StatusState,

    pub(super) armed: Armed,

    // Inputs
    pub(super) reset: bool,
    pub(super) crs: bool,
    pub(super) col: bool,
    pub(super) receiving: bool,
    pub(super) rx_cmd: Command,
    pub(super) tx_cmd: Command,
    pub(super) plca_txen: bool,
    pub(super) plca_txd: Option<Frame>,
    pub(super) frame_on_phy: bool,

    // Shared variables
    pub(super) cur_id: u16,
    pub(super) committed: bool,
    pub(super) active: bool,
    pub(super) plca_status: bool,
    pub(super) packet_pending: bool,
    pub(super) bc: u32,
    pub(super) a: u32,
    pub(super) b: u32,

    // Outputs
    pub(super) carrier: bool,
    pub(super) signal: bool,
    pub(super) tx_en: bool,

    mac_carrier: bool,
    mac_collision: bool,
}

impl PlcaCoordinator {
    pub fn new(config: PlcaConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            control: ControlState::Disable,
            data: DataState::Normal,
            status: StatusState::Inactive,
            armed: Armed::empty(),
            reset: false,
            crs: false,
            col: false,
            receiving: false,
            rx_cmd: Command::None,
            tx_cmd: Command::None,
            plca_txen: false,
            plca_txd: None,
            frame_on_phy: false,
            cur_id: 0,
            committed: false,
            active: false,
            plca_status: false,
            packet_pending: false,
            bc: 0,
            a: 0,
            b: 0,
            carrier: false,
            signal: false,
            tx_en: false,
            mac_carrier: false,
            mac_collision: false,
        })
    }

    pub fn config(&self) -> &PlcaConfig {
        &self.config
    }

    pub fn control_state(&self) -> ControlState {
        self.control
    }

    pub fn data_state(&self) -> DataState {
        self.data
    }

    pub fn status_state(&self) -> StatusState {
        self.status
    }

    /// Current transmit opportunity
    pub fn cur_id(&self) -> u16 {
        self.cur_id
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    /// PLCA is controlling the medium
    pub fn plca_status(&self) -> bool {
        self.plca_status
    }

    pub fn is_armed(&self, timer: PlcaTimer) -> bool {
        self.armed.contains(timer.into())
    }

    pub fn start<C: PlcaContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        debug!("Starting PLCA node {} of {}", self.config.local_id, self.config.node_count);
        self.evaluate(ctx)
    }

    /// Drive all three state machines back to their initial states
    pub fn reset<C: PlcaContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        debug!("Resetting PLCA node {}", self.config.local_id);

        self.reset = true;
        self.evaluate(ctx)?;

        self.reset = false;
        self.evaluate(ctx)
    }

    /// Request from the MAC
    pub fn handle_request<C: PlcaContext>(&mut self, request: PhyRequest, ctx: &mut C) -> Result<(), Error> {
        match request {
            PhyRequest::StartFrame(frame) => {
                trace!("MAC frame to {} at {}", frame.header.destination, ctx.now());
                self.plca_txen = true;
                self.plca_txd = Some(frame);
            },
            PhyRequest::EndFrame => {
                self.plca_txen = false;
                self.plca_txd = None;
                if self.frame_on_phy {
                    ctx.phy(PhyRequest::EndFrame);
                }
            },
            PhyRequest::StartJam => {
                if self.frame_on_phy {
                    ctx.phy(PhyRequest::StartJam);
                } else {
                    // Frame never left the delay line, time the jam locally
                    debug!("Local jam at {}", ctx.now());
                    self.plca_txd = None;
                    self.arm(PlcaTimer::Jam, LOCAL_JAM_BITS, ctx);
                }
            },
            PhyRequest::StartBeacon => return Err(Error::UnknownSignal(SignalKind::Beacon)),
            PhyRequest::StartCommit | PhyRequest::EndSignal => return Err(Error::UnknownSignal(SignalKind::Commit)),
        }

        self.evaluate(ctx)
    }

    /// Indication from the PHY
    pub fn handle_indication<C: PlcaContext>(&mut self, indication: PhyIndication, ctx: &mut C) -> Result<(), Error> {
        match indication {
            PhyIndication::CarrierSenseStart => self.crs = true,
            PhyIndication::CarrierSenseEnd => {
                self.crs = false;
                self.receiving = false;
                self.rx_cmd = Command::None;
            },
            PhyIndication::CollisionStart => self.col = true,
            PhyIndication::CollisionEnd => self.col = false,
            PhyIndication::ReceptionStart(kind) => {
                self.rx_cmd = match kind {
                    SignalKind::Beacon => Command::Beacon,
                    SignalKind::Commit => Command::Commit,
                    _ => Command::None,
                };
                self.receiving = kind != SignalKind::Beacon;
            },
            PhyIndication::ReceptionEnd(kind, frame) => {
                if kind == SignalKind::Data {
                    ctx.mac(PhyIndication::ReceptionEnd(kind, frame));
                }
            },
            PhyIndication::TransmissionStart(kind) => {
                if !kind.is_plca() {
                    ctx.mac(PhyIndication::TransmissionStart(kind));
                }
            },
            PhyIndication::TransmissionEnd(kind, frame) => match kind {
                SignalKind::Data | SignalKind::Jam => {
                    self.frame_on_phy = false;
                    self.plca_txen = false;
                    ctx.mac(PhyIndication::TransmissionEnd(kind, frame));
                },
                SignalKind::Beacon | SignalKind::Commit => {
                    // A commit may already have replaced the beacon that ended
                    let ended = match kind {
                        SignalKind::Beacon => Command::Beacon,
                        _ => Command::Commit,
                    };
                    if self.tx_cmd == ended {
                        self.tx_cmd = Command::None;
                    }
                },
            },
        }

        self.evaluate(ctx)
    }

    pub fn handle_timer<C: PlcaContext>(&mut self, timer: PlcaTimer, ctx: &mut C) -> Result<(), Error> {
        trace!("PLCA timer {} expired at {}", <&'static str>::from(timer), ctx.now());

        self.armed.remove(timer.into());

        match timer {
            PlcaTimer::Jam => {
                self.plca_txen = false;
                ctx.mac(PhyIndication::TransmissionEnd(SignalKind::Jam, None));
            },
            PlcaTimer::InvalidBeacon => {
                if self.config.local_id != 0 && self.control != ControlState::Disable {
                    warn!("No valid beacon seen by node {}, resynchronising", self.config.local_id);
                    self.enter_control(ControlState::Resync, ctx);
                }
            },
            _ => (),
        }

        self.evaluate(ctx)
    }

    /// Run the state machines until none of them moves, then report edges
    pub fn evaluate<C: PlcaContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        let initial = (self.control, self.data, self.status);
        let initial_id = self.cur_id;
        let mut steps = 0;

        loop {
            let before = (self.control, self.data, self.status);

            while let Some(next) = self.control_transition() {
                steps = Self::count_step(steps)?;
                self.enter_control(next, ctx);
            }

            self.data_during(ctx);
            while let Some(next) = self.data_transition() {
                steps = Self::count_step(steps)?;
                self.enter_data(next, ctx);
                self.data_during(ctx);
            }

            while let Some(next) = self.status_transition() {
                steps = Self::count_step(steps)?;
                self.enter_status(next, ctx);
            }

            if before == (self.control, self.data, self.status) {
                break;
            }
        }

        self.emit_edges(ctx);

        if initial != (self.control, self.data, self.status) {
            trace!("PLCA {} / {} / {}", self.control, self.data, self.status);
            ctx.observe(TelemetryEvent::PlcaStateChanged {
                control: self.control,
                data: self.data,
                status: self.status,
            });
        }

        if initial_id != self.cur_id {
            ctx.observe(TelemetryEvent::PlcaCurrentId(self.cur_id));
        }

        Ok(())
    }

    fn count_step(steps: usize) -> Result<usize, Error> {
        if steps >= MAX_PLCA_STEPS {
            return Err(Error::PlcaNotSettled(steps));
        }
        Ok(steps + 1)
    }

    /// Report carrier and collision changes to the MAC, once per edge
    fn emit_edges<C: PlcaContext>(&mut self, ctx: &mut C) {
        if self.carrier != self.mac_carrier {
            self.mac_carrier = self.carrier;
            ctx.mac(match self.carrier {
                true => PhyIndication::CarrierSenseStart,
                false => PhyIndication::CarrierSenseEnd,
            });
        }

        if self.signal != self.mac_collision {
            self.mac_collision = self.signal;
            ctx.mac(match self.signal {
                true => PhyIndication::CollisionStart,
                false => PhyIndication::CollisionEnd,
            });
        }
    }

    /// Open arrow transitions to the initial states
    pub(super) fn is_disabled(&self) -> bool {
        self.reset || !self.config.enabled || self.config.local_id == DISABLED_NODE_ID
    }

    pub(super) fn is_local_turn(&self) -> bool {
        self.cur_id == self.config.local_id as u16
    }

    pub(super) fn arm<C: PlcaContext>(&mut self, timer: PlcaTimer, bits: u64, ctx: &mut C) {
        ctx.schedule_after(bits_to_time(bits, self.config.bitrate), timer);
        self.armed.insert(timer.into());
    }

    pub(super) fn disarm<C: PlcaContext>(&mut self, timer: PlcaTimer, ctx: &mut C) {
        if self.armed.contains(timer.into()) {
            ctx.cancel(timer);
            self.armed.remove(timer.into());
        }
    }

    /// Cancel every armed timer in `mask`
    pub(super) fn disarm_all<C: PlcaContext>(&mut self, mask: Armed, ctx: &mut C) {
        for t in TIMERS.iter() {
            if mask.contains(Armed::from(*t)) {
                self.disarm(*t, ctx);
            }
        }
    }

    /// Hand the MAC frame to the PHY
    pub(super) fn release_frame<C: PlcaContext>(&mut self, ctx: &mut C) -> bool {
        match self.plca_txd.take() {
            Some(frame) => {
                ctx.phy(PhyRequest::StartFrame(frame));
                self.frame_on_phy = true;
                true
            },
            None => false,
        }
    }
}

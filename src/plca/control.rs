//! PLCA control state machine, hands out transmit opportunities

use log::{debug, trace};

use crate::phy::PhyRequest;
use crate::timer::PlcaTimer;

use super::coordinator::Armed;
use super::{Command, PlcaContext, PlcaCoordinator, DISABLED_NODE_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlState {
    Disable,
    Resync,
    Recover,
    SendBeacon,
    Syncing,
    WaitTo,
    EarlyReceive,
    Commit,
    Yield,
    Receive,
    Transmit,
    Burst,
    Abort,
    NextTxOpportunity,
}

impl ControlState {
    /// Timers armed on entry and cancelled when the state is left
    fn owned(&self) -> Armed {
        match self {
            ControlState::WaitTo | ControlState::Yield => Armed::TURN_TIMEOUT,
            ControlState::EarlyReceive => Armed::BEACON_DETECT,
            ControlState::SendBeacon => Armed::BEACON,
            ControlState::Burst => Armed::BURST,
            _ => Armed::empty(),
        }
    }
}

impl PlcaCoordinator {
    pub(super) fn control_transition(&self) -> Option<ControlState> {
        use ControlState::*;

        if self.is_disabled() {
            return match self.control {
                Disable => None,
                _ => Some(Disable),
            };
        }

        let local_id = self.config.local_id;
        let crs = self.crs;
        let to_armed = self.is_armed(PlcaTimer::TurnTimeout);

        match self.control {
            Disable if local_id == 0 => Some(Recover),
            Disable if local_id != DISABLED_NODE_ID => Some(Resync),
            Resync if local_id != 0 && crs => Some(EarlyReceive),
            Resync if local_id == 0 && !crs => Some(SendBeacon),
            Recover => Some(WaitTo),
            SendBeacon if !self.is_armed(PlcaTimer::Beacon) => Some(Syncing),
            Syncing if !crs => Some(WaitTo),

            WaitTo if crs => Some(EarlyReceive),
            WaitTo if self.active && self.is_local_turn() && self.packet_pending => Some(Commit),
            WaitTo if !to_armed && !self.is_local_turn() => Some(NextTxOpportunity),
            WaitTo if self.is_local_turn() => Some(Yield),

            EarlyReceive => {
                let beacon = self.rx_cmd == Command::Beacon;
                let detecting = self.is_armed(PlcaTimer::BeaconDetect);

                if local_id != 0 && !self.receiving && (beacon || (!crs && detecting)) {
                    Some(Syncing)
                } else if !crs && local_id != 0 && !beacon && !detecting {
                    Some(Resync)
                } else if !crs && local_id == 0 {
                    Some(Recover)
                } else if self.receiving && crs {
                    Some(Receive)
                } else {
                    None
                }
            },

            Commit if self.tx_en => Some(Transmit),
            Commit if !self.packet_pending => Some(Abort),

            Yield if crs && to_armed => Some(EarlyReceive),
            Yield if !to_armed => Some(NextTxOpportunity),

            Receive if !crs => Some(NextTxOpportunity),

            Transmit if !self.tx_en && !crs && self.bc >= self.config.max_burst_count => Some(NextTxOpportunity),
            Transmit if !self.tx_en && self.bc < self.config.max_burst_count => Some(Burst),

            Burst if self.tx_en => Some(Transmit),
            Burst if !self.is_armed(PlcaTimer::Burst) => Some(Abort),

            Abort if !crs => Some(NextTxOpportunity),

            NextTxOpportunity => {
                let wrapped = local_id == 0 && self.cur_id >= self.config.node_count;
                if wrapped || self.cur_id >= DISABLED_NODE_ID as u16 {
                    Some(Resync)
                } else {
                    Some(WaitTo)
                }
            },

            _ => None,
        }
    }

    pub(super) fn enter_control<C: PlcaContext>(&mut self, next: ControlState, ctx: &mut C) {
        use ControlState::*;

        let release = self.control.owned() - next.owned();
        self.disarm_all(release, ctx);

        trace!("PLCA control {} -> {} at {}", self.control, next, ctx.now());
        self.control = next;

        match next {
            Disable => {
                self.end_signal(ctx);
                self.committed = false;
                self.cur_id = 0;
                self.active = false;
                self.disarm(PlcaTimer::InvalidBeacon, ctx);
            },
            Resync | Recover => self.active = false,
            SendBeacon => {
                debug!("Sending beacon at {}", ctx.now());
                self.arm(PlcaTimer::Beacon, self.config.beacon_bits, ctx);
                ctx.phy(PhyRequest::StartBeacon);
                self.tx_cmd = Command::Beacon;
                self.active = true;
            },
            Syncing => {
                self.cur_id = 0;
                self.active = true;
                if self.config.local_id != 0 && self.rx_cmd != Command::Beacon {
                    self.arm(PlcaTimer::InvalidBeacon, self.config.invalid_beacon_bits, ctx);
                } else {
                    self.disarm(PlcaTimer::InvalidBeacon, ctx);
                }
            },
            WaitTo => self.arm(PlcaTimer::TurnTimeout, self.config.to_bits, ctx),
            EarlyReceive => {
                self.disarm(PlcaTimer::TurnTimeout, ctx);
                self.arm(PlcaTimer::BeaconDetect, self.config.beacon_detect_bits, ctx);
            },
            Commit => {
                debug!("Node {} committing at {}", self.config.local_id, ctx.now());
                ctx.phy(PhyRequest::StartCommit);
                self.tx_cmd = Command::Commit;
                self.committed = true;
                self.disarm(PlcaTimer::TurnTimeout, ctx);
                self.bc = 0;
            },
            Transmit => {
                self.end_signal(ctx);
                if self.bc >= self.config.max_burst_count {
                    self.committed = false;
                }
            },
            Burst => {
                self.bc += 1;
                ctx.phy(PhyRequest::StartCommit);
                self.tx_cmd = Command::Commit;
                self.arm(PlcaTimer::Burst, self.config.burst_bits, ctx);
            },
            Abort => self.end_signal(ctx),
            NextTxOpportunity => {
                self.cur_id = self.cur_id.saturating_add(1);
                self.committed = false;
            },
            Yield | Receive => (),
        }
    }

    /// Cut a beacon or commit this node has on the medium
    fn end_signal<C: PlcaContext>(&mut self, ctx: &mut C) {
        if self.tx_cmd != Command::None {
            ctx.phy(PhyRequest::EndSignal);
        }
    }
}

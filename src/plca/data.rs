//! PLCA data state machine
//!
//! Holds a MAC transmission in the delay line until the local transmit
//! opportunity, reporting a collision to the MAC when the opportunity is not
//! ours so it retries once the node has committed.

use log::trace;

use crate::timer::PlcaTimer;

use super::coordinator::Armed;
use super::{Command, PlcaContext, PlcaCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataState {
    Normal,
    WaitIdle,
    Idle,
    Receive,
    Hold,
    Collide,
    DelayPending,
    Pending,
    WaitMac,
    Transmit,
    Flush,
}

impl DataState {
    fn owned(&self) -> Armed {
        match self {
            DataState::Hold => Armed::HOLD,
            DataState::Collide | DataState::DelayPending => Armed::PENDING,
            DataState::WaitMac => Armed::COMMIT,
            _ => Armed::empty(),
        }
    }
}

impl PlcaCoordinator {
    pub(super) fn data_transition(&self) -> Option<DataState> {
        use DataState::*;

        if self.reset || !self.config.enabled || !self.plca_status {
            return match self.data {
                Normal => None,
                _ => Some(Normal),
            };
        }

        let txen = self.plca_txen;

        match self.data {
            Normal => Some(Idle),

            WaitIdle if !self.crs => Some(Idle),
            WaitIdle if txen => Some(Transmit),

            Idle if self.receiving && !txen && self.tx_cmd == Command::None => Some(Receive),
            Idle if txen => Some(Hold),

            Receive if !self.receiving && !txen => Some(Idle),
            Receive if txen => Some(Collide),

            Hold => {
                let holding = self.is_armed(PlcaTimer::Hold);
                if self.receiving || !holding {
                    Some(Collide)
                } else if self.committed {
                    Some(Transmit)
                } else {
                    None
                }
            },

            Collide if !txen => Some(DelayPending),
            DelayPending if !self.is_armed(PlcaTimer::Pending) => Some(Pending),
            Pending if self.committed => Some(WaitMac),

            WaitMac if txen => Some(Transmit),
            WaitMac if !self.is_armed(PlcaTimer::Commit) => Some(WaitIdle),

            Transmit if !txen && self.a > 0 => Some(Flush),
            Transmit if !txen => Some(WaitIdle),

            Flush if self.a == self.b => Some(WaitIdle),

            _ => None,
        }
    }

    pub(super) fn enter_data<C: PlcaContext>(&mut self, next: DataState, ctx: &mut C) {
        use DataState::*;

        let release = self.data.owned() - next.owned();
        self.disarm_all(release, ctx);

        trace!("PLCA data {} -> {} at {}", self.data, next, ctx.now());
        self.data = next;

        match next {
            Normal => self.packet_pending = false,
            WaitIdle | Idle => {
                self.packet_pending = false;
                self.carrier = false;
                self.signal = false;
                self.tx_en = false;
                self.a = 0;
                self.b = 0;
            },
            Hold => {
                self.packet_pending = true;
                self.carrier = true;
                self.a += 1;
                self.arm(PlcaTimer::Hold, self.config.delay_line_bits, ctx);
            },
            Collide => {
                self.packet_pending = false;
                self.carrier = true;
                self.signal = true;
                self.a = 0;
                self.b = 0;
                self.arm(PlcaTimer::Pending, self.config.pending_bits, ctx);
            },
            DelayPending => self.signal = false,
            Pending => self.packet_pending = true,
            WaitMac => {
                self.carrier = false;
                self.arm(PlcaTimer::Commit, self.config.commit_bits, ctx);
            },
            Transmit => {
                self.packet_pending = false;
                self.carrier = true;
                self.tx_en = true;
                self.signal = self.col;
                if self.col {
                    self.a = 0;
                }
                // A commit in flight is replaced by the frame
                if self.release_frame(ctx) {
                    self.tx_cmd = Command::None;
                }
            },
            Flush => {
                self.carrier = true;
                self.tx_en = true;
                self.signal = self.col;
                self.b += 1;
            },
            Receive => (),
        }
    }

    /// Outputs that follow their inputs for as long as a state is held
    pub(super) fn data_during<C: PlcaContext>(&mut self, ctx: &mut C) {
        match self.data {
            DataState::Normal => {
                self.carrier = self.crs;
                self.signal = self.col;
                self.tx_en = self.plca_txen;
                self.release_frame(ctx);
            },
            DataState::Receive => self.carrier = self.crs && self.rx_cmd != Command::Beacon,
            DataState::Transmit | DataState::Flush => self.signal = self.col,
            _ => (),
        }
    }
}

//! PLCA status state machine, reports whether PLCA controls the medium

use log::{info, trace};

use crate::timer::PlcaTimer;

use super::{PlcaContext, PlcaCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusState {
    Inactive,
    Active,
    /// Activity stopped, waiting out the hysteresis timer
    Hysteresis,
}

impl PlcaCoordinator {
    pub(super) fn status_transition(&self) -> Option<StatusState> {
        use StatusState::*;

        if self.reset || !self.config.enabled {
            return match self.status {
                Inactive => None,
                _ => Some(Inactive),
            };
        }

        match self.status {
            Inactive if self.active => Some(Active),
            Active if !self.active => Some(Hysteresis),
            Hysteresis if self.active => Some(Active),
            Hysteresis if !self.is_armed(PlcaTimer::Status) => Some(Inactive),
            _ => None,
        }
    }

    pub(super) fn enter_status<C: PlcaContext>(&mut self, next: StatusState, ctx: &mut C) {
        if self.status == StatusState::Hysteresis {
            self.disarm(PlcaTimer::Status, ctx);
        }

        trace!("PLCA status {} -> {} at {}", self.status, next, ctx.now());
        self.status = next;

        match next {
            StatusState::Inactive => {
                info!("PLCA inactive on node {}", self.config.local_id);
                self.plca_status = false;
            },
            StatusState::Active => {
                info!("PLCA active on node {}", self.config.local_id);
                self.plca_status = true;
            },
            StatusState::Hysteresis => self.arm(PlcaTimer::Status, self.config.hysteresis_bits, ctx),
        }
    }
}

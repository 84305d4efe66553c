//! Simulation time and timer API
//
// Copyright 2021 Ryan Kurte

/// Simulation timestamps in picoseconds
pub type SimTime = u64;

pub const PS_PER_NS: SimTime = 1_000;
pub const PS_PER_US: SimTime = 1_000_000;
pub const PS_PER_SEC: SimTime = 1_000_000_000_000;

/// Duration of `bits` at `bitrate` bits per second, rounded down
pub fn bits_to_time(bits: u64, bitrate: u64) -> SimTime {
    (bits as u128 * PS_PER_SEC as u128 / bitrate as u128) as SimTime
}

/// Number of whole bits sent in `duration` at `bitrate`
pub fn time_to_bits(duration: SimTime, bitrate: u64) -> u64 {
    (duration as u128 * bitrate as u128 / PS_PER_SEC as u128) as u64
}

/// MAC timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacTimer {
    InterFrameGap,
    Backoff,
}

/// PHY timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyTimer {
    /// Outbound signal completed
    TxEnd,
    /// Last overlapping inbound signal completed
    RxChannelIdle,
}

/// PLCA timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlcaTimer {
    Beacon,
    BeaconDetect,
    InvalidBeacon,
    Burst,
    TurnTimeout,
    Hold,
    Pending,
    Commit,
    Status,
    /// Jam of a frame that never reached the PHY
    Jam,
}

/// Tagged timer identity, one namespace per layer of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    Mac(MacTimer),
    Phy(PhyTimer),
    Plca(PlcaTimer),
}

/// Scheduler provides the current time and one-shot timers.
///
/// Scheduling a timer that is already pending replaces it,
/// cancelling a timer that is not pending has no effect.
pub trait Scheduler<T> {
    /// Current simulation time
    fn now(&self) -> SimTime;

    /// Fire `timer` after `delay`
    fn schedule_after(&mut self, delay: SimTime, timer: T);

    /// Cancel a pending timer
    fn cancel(&mut self, timer: T);
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::vec::Vec;

    use super::SimTime;

    /// Mock scheduler implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockScheduler<T> {
        now: SimTime,
        pending: Vec<(SimTime, T)>,
    }

    impl <T: Clone + PartialEq> MockScheduler<T> {
        pub fn new() -> Self {
            Self { now: 0, pending: Vec::new() }
        }

        pub fn set_now(&mut self, now: SimTime) {
            self.now = now;
        }

        /// Expiry time of a pending timer
        pub fn expiry(&self, timer: &T) -> Option<SimTime> {
            self.pending.iter().find(|(_, t)| t == timer).map(|(at, _)| *at)
        }

        pub fn is_pending(&self, timer: &T) -> bool {
            self.expiry(timer).is_some()
        }

        /// Advance to the next pending timer and return it
        pub fn fire_next(&mut self) -> Option<T> {
            let idx = self.pending.iter().enumerate()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(i, _)| i)?;

            let (at, timer) = self.pending.remove(idx);
            self.now = self.now.max(at);

            Some(timer)
        }
    }

    impl <T: Clone + PartialEq> super::Scheduler<T> for MockScheduler<T> {
        fn now(&self) -> SimTime {
            self.now
        }

        fn schedule_after(&mut self, delay: SimTime, timer: T) {
            self.pending.retain(|(_, t)| t != &timer);
            self.pending.push((self.now + delay, timer));
        }

        fn cancel(&mut self, timer: T) {
            self.pending.retain(|(_, t)| t != &timer);
        }
    }
}

//! CSMA/CD MAC state machine

use log::{debug, trace, info, warn};

use rand_core::RngCore;

use crate::error::{DropReason, Error, PacketDrop};
use crate::frame::{fcs, Frame};
use crate::phy::{PhyIndication, PhyRequest, SignalKind};
use crate::telemetry::TelemetryEvent;
use crate::timer::{bits_to_time, MacTimer};

use super::{AddressFilter, BackoffScheduler, Delivery, MacConfig, MacContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacState {
    Idle,
    WaitInterFrameGap,
    Transmitting,
    Jamming,
    BackingOff,
    Receiving,
}

#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum MacEvent {
    /// Frame taken from the transmit queue
    UpperPacket(Frame),
    /// Frame received by the PHY
    LowerPacket(Frame),
    CarrierSenseStart,
    CarrierSenseEnd,
    CollisionStart,
    /// Frame transmission completed
    TransmissionEnded,
    InterFrameGapElapsed,
    /// Jam transmission completed
    JamElapsed,
    BackoffElapsed,
}

/// CSMA/CD MAC, generic over the backoff random source
pub struct CsmaMac<R> {
    config: MacConfig,
    filter: AddressFilter,
    backoff: BackoffScheduler,
    rng: R,

    state: MacState,
    carrier_sense: bool,

    current_tx: Option<Frame>,
    retries: u32,
}

impl <R: RngCore> CsmaMac<R> {
    pub fn new(config: MacConfig, rng: R) -> Self {
        let filter = AddressFilter::new(config.address, config.promiscuous);
        let backoff = BackoffScheduler::new(config.backoff_range_limit, config.slot_time_bits, config.bitrate);

        Self {
            config,
            filter,
            backoff,
            rng,
            state: MacState::Idle,
            carrier_sense: false,
            current_tx: None,
            retries: 0,
        }
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    /// Collisions seen by the frame currently in flight
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn carrier_sense(&self) -> bool {
        self.carrier_sense
    }

    /// Frame latched for (re)transmission
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_tx.as_ref()
    }

    /// Transmit queue has frames, start transmitting if the MAC is free
    pub fn handle_can_dequeue<C: MacContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        if self.state == MacState::Idle && !self.carrier_sense && self.current_tx.is_none() && ctx.can_dequeue() {
            let frame = ctx.dequeue()?;
            return self.handle(MacEvent::UpperPacket(frame), ctx);
        }
        Ok(())
    }

    /// Translate a PHY indication into MAC events
    pub fn handle_indication<C: MacContext>(&mut self, indication: PhyIndication, ctx: &mut C) -> Result<(), Error> {
        let full_duplex = self.config.full_duplex;

        match indication {
            PhyIndication::CarrierSenseStart if !full_duplex => {
                if self.carrier_sense {
                    return Err(Error::InconsistentState("carrier sense started twice"));
                }
                self.carrier_sense = true;
                self.handle(MacEvent::CarrierSenseStart, ctx)
            },
            PhyIndication::CarrierSenseEnd if !full_duplex => {
                if !self.carrier_sense {
                    return Err(Error::InconsistentState("carrier sense ended twice"));
                }
                self.carrier_sense = false;
                self.handle(MacEvent::CarrierSenseEnd, ctx)
            },
            PhyIndication::CollisionStart if !full_duplex => self.handle(MacEvent::CollisionStart, ctx),
            PhyIndication::TransmissionEnd(SignalKind::Data, _) => self.handle(MacEvent::TransmissionEnded, ctx),
            PhyIndication::TransmissionEnd(SignalKind::Jam, _) => self.handle(MacEvent::JamElapsed, ctx),
            PhyIndication::TransmissionEnd(kind, _) => Err(Error::UnknownSignal(kind)),
            PhyIndication::ReceptionEnd(SignalKind::Data, Some(frame)) => self.handle(MacEvent::LowerPacket(frame), ctx),
            _ => Ok(()),
        }
    }

    pub fn handle_timer<C: MacContext>(&mut self, timer: MacTimer, ctx: &mut C) -> Result<(), Error> {
        match timer {
            MacTimer::InterFrameGap => self.handle(MacEvent::InterFrameGapElapsed, ctx),
            MacTimer::Backoff => self.handle(MacEvent::BackoffElapsed, ctx),
        }
    }

    /// Run one event through the state machine
    pub fn handle<C: MacContext>(&mut self, event: MacEvent, ctx: &mut C) -> Result<(), Error> {
        use MacState::*;

        trace!("MAC event {} in state {}", <&'static str>::from(&event), self.state);

        let next = match (self.state, event) {
            // Received frames are processed without leaving the current state
            (_, MacEvent::LowerPacket(frame)) => {
                self.process_received(frame, ctx);
                return Ok(());
            },

            (Idle, MacEvent::UpperPacket(frame)) => {
                self.current_tx = Some(frame);
                Transmitting
            },
            (Idle, MacEvent::CarrierSenseStart) => Receiving,

            (WaitInterFrameGap, MacEvent::InterFrameGapElapsed) => {
                if self.current_tx.is_some() {
                    Transmitting
                } else if ctx.can_dequeue() {
                    self.current_tx = Some(ctx.dequeue()?);
                    Transmitting
                } else if self.carrier_sense {
                    Receiving
                } else {
                    Idle
                }
            },
            (WaitInterFrameGap, MacEvent::CarrierSenseStart) => {
                ctx.cancel(MacTimer::InterFrameGap);
                Receiving
            },

            (Transmitting, MacEvent::TransmissionEnded) => {
                if let Some(f) = self.current_tx.take() {
                    debug!("Transmitted frame to {} after {} retries", f.header.destination, self.retries);
                }
                self.retries = 0;
                WaitInterFrameGap
            },
            (Transmitting, MacEvent::CollisionStart) => Jamming,

            (Jamming, MacEvent::JamElapsed) => {
                self.retry_transmission(ctx);
                BackingOff
            },

            (BackingOff, MacEvent::BackoffElapsed) => {
                if self.carrier_sense {
                    Receiving
                } else {
                    WaitInterFrameGap
                }
            },

            (Receiving, MacEvent::CarrierSenseEnd) => WaitInterFrameGap,

            // Carrier changes while the outcome is already decided
            (WaitInterFrameGap, MacEvent::CarrierSenseEnd)
            | (Transmitting, MacEvent::CarrierSenseStart)
            | (Transmitting, MacEvent::CarrierSenseEnd)
            | (Jamming, MacEvent::CarrierSenseStart)
            | (Jamming, MacEvent::CarrierSenseEnd)
            | (BackingOff, MacEvent::CarrierSenseStart)
            | (BackingOff, MacEvent::CarrierSenseEnd) => return Ok(()),

            // Collisions between other stations
            (Jamming, MacEvent::CollisionStart)
            | (BackingOff, MacEvent::CollisionStart)
            | (Receiving, MacEvent::CollisionStart) => return Ok(()),

            (state, event) => {
                return Err(Error::UnhandledEvent {
                    machine: "mac",
                    state: state.into(),
                    event: (&event).into(),
                })
            },
        };

        self.transition(next, ctx)
    }

    fn transition<C: MacContext>(&mut self, next: MacState, ctx: &mut C) -> Result<(), Error> {
        let prev = self.state;
        self.state = next;

        if prev != next {
            trace!("MAC state {} -> {} at {}", prev, next, ctx.now());
            ctx.observe(TelemetryEvent::MacStateChanged { from: prev, to: next });
        }

        // Enter actions
        match next {
            MacState::Idle => {
                if self.carrier_sense {
                    return Err(Error::InconsistentState("idle with carrier sensed"));
                }
            },
            MacState::WaitInterFrameGap => {
                let gap = bits_to_time(self.config.inter_frame_gap_bits, self.config.bitrate);
                ctx.schedule_after(gap, MacTimer::InterFrameGap);
            },
            MacState::Transmitting => self.start_transmission(ctx)?,
            MacState::Jamming => {
                debug!("Collision at {}, jamming", ctx.now());
                ctx.phy(PhyRequest::StartJam);
            },
            MacState::BackingOff => self.schedule_backoff(ctx),
            MacState::Receiving => (),
        }

        Ok(())
    }

    /// Validate, pad and checksum the latched frame and hand it to the PHY
    fn start_transmission<C: MacContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        let config = &self.config;
        let frame = self.current_tx.as_mut()
            .ok_or(Error::InconsistentState("transmitting without a frame"))?;

        if frame.header.destination == config.address {
            return Err(Error::DestinationIsLocal(config.address));
        }

        fcs::add_padding_and_set_fcs(frame, config.min_frame_bytes, config.fcs_mode);

        if frame.byte_length() > config.max_frame_bytes {
            return Err(Error::FrameTooLarge { length: frame.byte_length(), max: config.max_frame_bytes });
        }

        debug!("Starting transmission of {} bytes to {} at {}", frame.byte_length(), frame.header.destination, ctx.now());

        ctx.phy(PhyRequest::StartFrame(frame.clone()));

        Ok(())
    }

    /// Count a collision, dropping the frame once attempts are exhausted
    fn retry_transmission<C: MacContext>(&mut self, ctx: &mut C) {
        self.retries += 1;

        if self.retries <= self.config.max_attempts {
            return;
        }

        if let Some(frame) = self.current_tx.take() {
            warn!("Dropping frame to {} after {} attempts", frame.header.destination, self.config.max_attempts);

            let drop = PacketDrop::new(DropReason::RetryLimitReached, frame)
                .with_limit(self.config.max_attempts);
            ctx.observe(TelemetryEvent::PacketDropped(drop));
        }

        self.retries = 0;
    }

    fn schedule_backoff<C: MacContext>(&mut self, ctx: &mut C) {
        let range = self.backoff.range(self.retries);
        let slot = self.backoff.slot(self.retries, &mut self.rng);
        let delay = self.backoff.delay(slot);

        debug!("Backoff slot {} of {} after {} retries at {}", slot, range, self.retries, ctx.now());

        ctx.observe(TelemetryEvent::BackoffStarted { retries: self.retries, range, slot, delay });
        ctx.schedule_after(delay, MacTimer::Backoff);
    }

    /// Verify and filter a received frame, delivering it upwards
    fn process_received<C: MacContext>(&mut self, frame: Frame, ctx: &mut C) {
        let length = frame.byte_length();

        let damaged = frame.has_bit_error()
            || length < self.config.min_frame_bytes
            || length > self.config.max_frame_bytes
            || !fcs::verify_fcs(&frame);

        let reason = if damaged {
            Some(DropReason::IncorrectlyReceived)
        } else if self.filter.is_frame_not_for_us(&frame) {
            Some(DropReason::NotAddressedToUs)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!("Dropping received frame from {}: {}", frame.header.source, reason);
            ctx.observe(TelemetryEvent::PacketDropped(PacketDrop::new(reason, frame)));
            return;
        }

        info!("Received {} bytes from {}", length, frame.header.source);

        ctx.deliver(Delivery {
            source: frame.header.source,
            destination: frame.header.destination,
            interface_id: self.config.interface_id,
            frame,
        });
    }
}

//! CSMA/CD physical layer
//
// Copyright 2021 Ryan Kurte

use heapless::Vec;
use log::{debug, trace};

use crate::error::Error;
use crate::frame::Frame;
use crate::telemetry::TelemetryEvent;
use crate::timer::{bits_to_time, PhyTimer, SimTime};

use super::{PhyConfig, PhyContext, PhyIndication, PhyRequest, Signal, SignalKind, TransmissionId};

/// Maximum number of concurrently tracked inbound signals
pub const MAX_OVERLAPPING_SIGNALS: usize = 32;

/// PHY state, in full duplex mode only transmission is reflected
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyState {
    Idle,
    Transmitting,
    Receiving,
    Collision,
}

#[derive(Debug, strum::IntoStaticStr)]
enum PhyEvent {
    TxStart(Signal),
    TxEnd,
    RxStart(Signal),
    RxUpdate(Signal),
    RxChannelIdle,
}

#[derive(Debug, Clone, PartialEq)]
struct Reception {
    signal: Signal,
    end: SimTime,
}

/// Physical layer multiplexing overlapping inbound signals and detecting
/// collisions with the local transmission
#[derive(Debug)]
pub struct CsmaPhy {
    config: PhyConfig,
    state: PhyState,

    tx: Option<Signal>,

    rx: Vec<Reception, MAX_OVERLAPPING_SIGNALS>,
    rx_end: Option<SimTime>,
    collided: bool,
}

impl CsmaPhy {
    pub fn new(config: PhyConfig) -> Self {
        Self {
            config,
            state: PhyState::Idle,
            tx: None,
            rx: Vec::new(),
            rx_end: None,
            collided: false,
        }
    }

    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    pub fn state(&self) -> PhyState {
        self.state
    }

    /// Signal currently being transmitted
    pub fn transmitted_signal(&self) -> Option<&Signal> {
        self.tx.as_ref()
    }

    /// Signal currently being received, if there is exactly one
    pub fn received_signal(&self) -> Option<&Signal> {
        match self.rx.len() {
            1 => Some(&self.rx[0].signal),
            _ => None,
        }
    }

    pub fn is_receiving(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Dispatch a request from the upper layer
    pub fn handle_request<C: PhyContext>(&mut self, request: PhyRequest, ctx: &mut C) -> Result<(), Error> {
        match request {
            PhyRequest::StartFrame(frame) => self.start_frame_transmission(frame, ctx),
            PhyRequest::EndFrame => self.end_frame_transmission(ctx),
            PhyRequest::StartJam => self.start_jam_signal_transmission(ctx),
            PhyRequest::StartBeacon => self.start_beacon_signal_transmission(ctx),
            PhyRequest::StartCommit => self.start_commit_signal_transmission(ctx),
            PhyRequest::EndSignal => self.end_signal_transmission(ctx),
        }
    }

    /// Handle a signal arriving from the medium
    pub fn handle_signal<C: PhyContext>(&mut self, signal: Signal, ctx: &mut C) -> Result<(), Error> {
        if signal.full_duplex != self.config.full_duplex {
            return Err(Error::DuplexMismatch);
        }
        if self.config.full_duplex && signal.kind == SignalKind::Jam {
            return Err(Error::StrayJamSignal);
        }

        if !signal.is_update {
            return self.handle(PhyEvent::RxStart(signal), ctx);
        }

        if self.is_tracking(signal.transmission_id) {
            return self.handle(PhyEvent::RxUpdate(signal), ctx);
        }

        // Update for a transmission that is no longer tracked
        if signal.remaining() == 0 {
            trace!("Ignoring completed update for {:?}", signal.transmission_id);
            return Ok(());
        }

        self.handle(PhyEvent::RxStart(signal), ctx)
    }

    pub fn handle_timer<C: PhyContext>(&mut self, timer: PhyTimer, ctx: &mut C) -> Result<(), Error> {
        match timer {
            PhyTimer::TxEnd => self.handle(PhyEvent::TxEnd, ctx),
            PhyTimer::RxChannelIdle => {
                self.rx_end = None;
                self.handle(PhyEvent::RxChannelIdle, ctx)
            },
        }
    }

    /// Start transmitting a frame.
    ///
    /// A commit in flight is promoted to the frame, keeping the medium busy
    /// without a gap.
    pub fn start_frame_transmission<C: PhyContext>(&mut self, frame: Frame, ctx: &mut C) -> Result<(), Error> {
        let now = ctx.now();

        match self.tx.as_ref().map(|s| s.kind) {
            Some(SignalKind::Commit) => return self.promote_commit(frame, ctx),
            Some(SignalKind::Beacon) => self.end_signal_transmission(ctx)?,
            Some(_) => return Err(Error::InconsistentState("frame requested during transmission")),
            None => (),
        }

        let signal = Signal::data(frame, self.config.bitrate, now);
        self.handle(PhyEvent::TxStart(signal), ctx)
    }

    /// End the current frame early
    pub fn end_frame_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        match self.tx.as_ref().map(|s| s.kind) {
            Some(SignalKind::Data) => (),
            _ => return Err(Error::InconsistentState("no frame transmission in progress")),
        }

        ctx.cancel(PhyTimer::TxEnd);
        self.cut_transmission(ctx);
        self.handle(PhyEvent::TxEnd, ctx)
    }

    /// Cut any transmission in flight and start a jam
    pub fn start_jam_signal_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        if self.config.full_duplex {
            return Err(Error::StrayJamSignal);
        }

        if self.tx.is_some() {
            ctx.cancel(PhyTimer::TxEnd);
            let truncated = self.cut_transmission(ctx);

            if let Some(s) = self.tx.take() {
                debug!("Jamming, {} transmission {:?} truncated: {}", s.kind, s.transmission_id, truncated);
                ctx.observe(TelemetryEvent::TransmissionEnded { kind: s.kind, id: s.transmission_id, truncated });
            }
        }

        let jam = Signal::control(SignalKind::Jam, self.config.jam_bits, self.config.bitrate, ctx.now());
        self.handle(PhyEvent::TxStart(jam), ctx)
    }

    pub fn start_beacon_signal_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        self.start_control(SignalKind::Beacon, self.config.beacon_bits, ctx)
    }

    pub fn start_commit_signal_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        self.start_control(SignalKind::Commit, self.config.commit_max_bits, ctx)
    }

    /// End a beacon or commit in flight, other transmissions are unaffected
    pub fn end_signal_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> Result<(), Error> {
        match self.tx.as_ref().map(|s| s.kind) {
            Some(kind) if kind.is_plca() => (),
            _ => return Ok(()),
        }

        ctx.cancel(PhyTimer::TxEnd);
        self.cut_transmission(ctx);
        self.handle(PhyEvent::TxEnd, ctx)
    }

    fn start_control<C: PhyContext>(&mut self, kind: SignalKind, bits: u64, ctx: &mut C) -> Result<(), Error> {
        match self.tx.as_ref().map(|s| s.kind) {
            Some(k) if k.is_plca() => self.end_signal_transmission(ctx)?,
            Some(_) => return Err(Error::InconsistentState("control signal requested during transmission")),
            None => (),
        }

        let signal = Signal::control(kind, bits, self.config.bitrate, ctx.now());
        self.handle(PhyEvent::TxStart(signal), ctx)
    }

    fn promote_commit<C: PhyContext>(&mut self, frame: Frame, ctx: &mut C) -> Result<(), Error> {
        let now = ctx.now();
        let tx = self.tx.as_mut().ok_or(Error::InconsistentState("no commit to promote"))?;

        tx.promote(frame, now);

        let mut update = tx.clone();
        update.is_update = true;
        update.sent_at = now;

        let id = tx.transmission_id;
        let remaining = tx.end_time() - now;

        debug!("Promoting commit {:?} to data at {}", id, now);

        ctx.send_signal(update);
        ctx.schedule_after(remaining, PhyTimer::TxEnd);
        ctx.indicate(PhyIndication::TransmissionStart(SignalKind::Data));
        ctx.observe(TelemetryEvent::TransmissionStarted { kind: SignalKind::Data, id });

        Ok(())
    }

    /// Shorten the outbound signal to end now, notifying the medium
    fn cut_transmission<C: PhyContext>(&mut self, ctx: &mut C) -> bool {
        let now = ctx.now();
        let tx = match self.tx.as_mut() {
            Some(tx) => tx,
            None => return false,
        };

        if !tx.cut(now.saturating_sub(tx.start)) {
            return false;
        }

        let mut update = tx.clone();
        update.is_update = true;
        update.sent_at = now;
        ctx.send_signal(update);

        true
    }

    /// Transmission `id` is among the current receptions
    pub fn is_tracking(&self, id: TransmissionId) -> bool {
        self.rx.iter().any(|r| r.signal.transmission_id == id)
    }

    fn handle<C: PhyContext>(&mut self, event: PhyEvent, ctx: &mut C) -> Result<(), Error> {
        use PhyState::*;

        if self.config.full_duplex {
            return self.handle_full_duplex(event, ctx);
        }

        trace!("PHY event {:?} in state {}", <&'static str>::from(&event), self.state);

        let next = match (self.state, event) {
            (Idle, PhyEvent::TxStart(s)) => {
                self.start_transmit(s, ctx);
                Transmitting
            },
            (Idle, PhyEvent::RxStart(s)) => {
                self.track(s, ctx)?;
                Receiving
            },
            (Transmitting, PhyEvent::TxStart(s)) if self.tx.is_none() => {
                self.start_transmit(s, ctx);
                Transmitting
            },
            (Transmitting, PhyEvent::TxEnd) => {
                self.end_transmit(ctx);
                Idle
            },
            (Transmitting, PhyEvent::RxStart(s)) => {
                self.track(s, ctx)?;
                self.start_collision(ctx);
                Collision
            },
            (Receiving, PhyEvent::TxStart(s)) => {
                self.start_transmit(s, ctx);
                self.start_collision(ctx);
                Collision
            },
            (Receiving, PhyEvent::RxStart(s)) => {
                if self.is_back_to_back(ctx.now()) {
                    // Previous signal ends within half a bit, complete it first
                    self.receive_back_to_back(s, ctx)?;
                    Receiving
                } else {
                    self.track(s, ctx)?;
                    self.start_collision(ctx);
                    Collision
                }
            },
            (Receiving, PhyEvent::RxUpdate(s)) => {
                self.track(s, ctx)?;
                Receiving
            },
            (Receiving, PhyEvent::RxChannelIdle) => {
                self.end_receive(ctx);
                Idle
            },
            (Collision, PhyEvent::TxStart(s)) if self.tx.is_none() => {
                self.start_transmit(s, ctx);
                Collision
            },
            (Collision, PhyEvent::TxEnd) => {
                self.end_transmit(ctx);
                if self.rx.is_empty() {
                    self.end_collision(ctx);
                    Idle
                } else {
                    Collision
                }
            },
            (Collision, PhyEvent::RxStart(s)) | (Collision, PhyEvent::RxUpdate(s)) => {
                self.track(s, ctx)?;
                Collision
            },
            (Collision, PhyEvent::RxChannelIdle) => {
                self.end_receive(ctx);
                if self.tx.is_some() {
                    Collision
                } else {
                    self.end_collision(ctx);
                    Idle
                }
            },
            (state, event) => {
                return Err(Error::UnhandledEvent {
                    machine: "phy",
                    state: state.into(),
                    event: (&event).into(),
                })
            },
        };

        self.set_state(next, ctx);

        Ok(())
    }

    /// Full duplex links never collide, reception is independent of transmission
    fn handle_full_duplex<C: PhyContext>(&mut self, event: PhyEvent, ctx: &mut C) -> Result<(), Error> {
        match event {
            PhyEvent::TxStart(s) if self.tx.is_none() => {
                self.start_transmit(s, ctx);
                self.set_state(PhyState::Transmitting, ctx);
            },
            PhyEvent::TxEnd => {
                self.end_transmit(ctx);
                self.set_state(PhyState::Idle, ctx);
            },
            PhyEvent::RxStart(s) if self.is_back_to_back(ctx.now()) => self.receive_back_to_back(s, ctx)?,
            PhyEvent::RxStart(s) | PhyEvent::RxUpdate(s) => self.track(s, ctx)?,
            PhyEvent::RxChannelIdle => self.end_receive(ctx),
            event => {
                return Err(Error::UnhandledEvent {
                    machine: "phy",
                    state: self.state.into(),
                    event: (&event).into(),
                })
            },
        }

        Ok(())
    }

    fn set_state<C: PhyContext>(&mut self, next: PhyState, ctx: &mut C) {
        if self.state != next {
            trace!("PHY state {} -> {}", self.state, next);
            ctx.observe(TelemetryEvent::PhyStateChanged { from: self.state, to: next });
            self.state = next;
        }
    }

    fn start_transmit<C: PhyContext>(&mut self, mut signal: Signal, ctx: &mut C) {
        let now = ctx.now();

        signal.start = now;
        signal.sent_at = now;
        signal.full_duplex = self.config.full_duplex;

        let id = ctx.send_signal(signal.clone());
        signal.transmission_id = id;

        debug!("Transmission {:?} ({}) started at {} for {} ps", id, signal.kind, now, signal.duration);

        ctx.schedule_after(signal.duration, PhyTimer::TxEnd);
        ctx.indicate(PhyIndication::TransmissionStart(signal.kind));
        ctx.observe(TelemetryEvent::TransmissionStarted { kind: signal.kind, id });

        self.tx = Some(signal);
    }

    fn end_transmit<C: PhyContext>(&mut self, ctx: &mut C) {
        let signal = match self.tx.take() {
            Some(s) => s,
            None => return,
        };

        trace!("Transmission {:?} ({}) ended at {}", signal.transmission_id, signal.kind, ctx.now());

        ctx.observe(TelemetryEvent::TransmissionEnded {
            kind: signal.kind,
            id: signal.transmission_id,
            truncated: signal.bit_error,
        });

        let frame = match signal.kind {
            SignalKind::Data => signal.frame,
            _ => None,
        };
        ctx.indicate(PhyIndication::TransmissionEnd(signal.kind, frame));
    }

    /// Add or replace an inbound signal and retarget the channel idle timer
    fn track<C: PhyContext>(&mut self, signal: Signal, ctx: &mut C) -> Result<(), Error> {
        self.track_signal(signal, true, ctx)
    }

    /// Complete the current reception and start on `signal`.
    ///
    /// Data following data keeps the carrier up, as a burst commit does
    /// after a frame. Anything else drops carrier for the handover so PLCA
    /// sees the end of a beacon.
    fn receive_back_to_back<C: PhyContext>(&mut self, signal: Signal, ctx: &mut C) -> Result<(), Error> {
        let continuous = self.rx.iter().all(|r| r.signal.kind == SignalKind::Data);

        trace!("Back to back {} reception at {}, carrier held: {}", signal.kind, ctx.now(), continuous);

        self.complete_receptions(ctx);
        if continuous {
            self.track_signal(signal, false, ctx)
        } else {
            if !self.config.full_duplex {
                ctx.indicate(PhyIndication::CarrierSenseEnd);
            }
            self.track_signal(signal, true, ctx)
        }
    }

    fn track_signal<C: PhyContext>(&mut self, signal: Signal, announce: bool, ctx: &mut C) -> Result<(), Error> {
        let now = ctx.now();
        let end = now + signal.remaining();
        let id = signal.transmission_id;
        let kind = signal.kind;

        if let Some(i) = self.rx.iter().position(|r| r.signal.transmission_id == id) {
            trace!("Updated reception {:?}, ends at {}", id, end);
            self.rx[i] = Reception { signal, end };
        } else {
            if announce && self.rx.is_empty() && !self.config.full_duplex {
                ctx.indicate(PhyIndication::CarrierSenseStart);
            }

            ctx.indicate(PhyIndication::ReceptionStart(kind));
            ctx.observe(TelemetryEvent::ReceptionStarted { kind, id });

            self.rx.push(Reception { signal, end }).map_err(|_| Error::TooManySignals)?;

            if !self.config.full_duplex && (self.tx.is_some() || self.rx.len() > 1) {
                self.collided = true;
            }
        }

        let max_end = self.rx.iter().map(|r| r.end).max().unwrap_or(now);
        if self.rx_end != Some(max_end) {
            self.rx_end = Some(max_end);
            ctx.schedule_after(max_end - now, PhyTimer::RxChannelIdle);
        }

        Ok(())
    }

    /// Complete the tracked receptions and release the carrier
    fn end_receive<C: PhyContext>(&mut self, ctx: &mut C) {
        self.complete_receptions(ctx);

        if !self.config.full_duplex {
            ctx.indicate(PhyIndication::CarrierSenseEnd);
        }
    }

    /// Deliver a lone intact signal, discard anything overlapping
    fn complete_receptions<C: PhyContext>(&mut self, ctx: &mut C) {
        ctx.cancel(PhyTimer::RxChannelIdle);
        self.rx_end = None;

        let delivered = !self.collided && self.rx.len() == 1;

        if delivered {
            let signal = &self.rx[0].signal;
            let frame = signal.decapsulate();
            let kind = signal.kind;

            trace!("Reception {:?} ({}) complete at {}", signal.transmission_id, kind, ctx.now());

            ctx.indicate(PhyIndication::ReceptionEnd(kind, frame));
            ctx.observe(TelemetryEvent::ReceptionEnded { kind, delivered: true });
        } else {
            for r in self.rx.iter() {
                ctx.observe(TelemetryEvent::ReceptionEnded { kind: r.signal.kind, delivered: false });
            }
        }

        self.rx.clear();
        self.collided = false;
    }

    fn start_collision<C: PhyContext>(&mut self, ctx: &mut C) {
        debug!("Collision detected at {}", ctx.now());

        self.collided = true;
        ctx.indicate(PhyIndication::CollisionStart);
        ctx.observe(TelemetryEvent::Collision);
    }

    fn end_collision<C: PhyContext>(&mut self, ctx: &mut C) {
        debug!("Collision cleared at {}", ctx.now());
        ctx.indicate(PhyIndication::CollisionEnd);
    }

    fn is_back_to_back(&self, now: SimTime) -> bool {
        let half_bit = bits_to_time(1, self.config.bitrate) / 2;
        match self.rx_end {
            Some(end) => end.saturating_sub(now) < half_bit,
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use bytes::Bytes;

    use super::*;
    use crate::frame::{EthernetHeader, MacAddress};
    use crate::phy::{BEACON_SIGNAL_BITS, COMMIT_SIGNAL_MAX_BITS};
    use crate::telemetry::Observer;
    use crate::timer::{mock::MockScheduler, Scheduler, PS_PER_NS};

    /// Records everything the PHY does to its collaborators
    struct MockContext {
        timers: MockScheduler<PhyTimer>,
        sent: Vec<Signal>,
        indications: Vec<PhyIndication>,
        events: Vec<TelemetryEvent>,
        next_id: u64,
    }

    impl MockContext {
        fn new() -> Self {
            Self {
                timers: MockScheduler::new(),
                sent: Vec::new(),
                indications: Vec::new(),
                events: Vec::new(),
                next_id: 100,
            }
        }

        fn count(&self, i: &PhyIndication) -> usize {
            self.indications.iter().filter(|v| *v == i).count()
        }

        fn collisions(&self) -> usize {
            self.count(&PhyIndication::CollisionStart)
        }
    }

    impl Scheduler<PhyTimer> for MockContext {
        fn now(&self) -> SimTime {
            self.timers.now()
        }

        fn schedule_after(&mut self, delay: SimTime, timer: PhyTimer) {
            self.timers.schedule_after(delay, timer)
        }

        fn cancel(&mut self, timer: PhyTimer) {
            self.timers.cancel(timer)
        }
    }

    impl Observer for MockContext {
        fn observe(&mut self, event: TelemetryEvent) {
            self.events.push(event);
        }
    }

    impl PhyContext for MockContext {
        fn send_signal(&mut self, mut signal: Signal) -> TransmissionId {
            if !signal.is_update {
                self.next_id += 1;
                signal.transmission_id = TransmissionId(self.next_id);
            }
            let id = signal.transmission_id;
            self.sent.push(signal);
            id
        }

        fn indicate(&mut self, indication: PhyIndication) {
            self.indications.push(indication);
        }
    }

    fn frame() -> Frame {
        let h = EthernetHeader::new(MacAddress::local(1), MacAddress::local(2), 0x0800);
        let mut f = Frame::new(h, Bytes::from_static(&[0u8; 82]));
        crate::frame::fcs::add_padding_and_set_fcs(&mut f, 64, crate::frame::FcsMode::DeclaredCorrect);
        f
    }

    /// Inbound data signal as put on the medium by a peer at `start`
    fn inbound(id: u64, start: SimTime) -> Signal {
        let mut s = Signal::data(frame(), 100_000_000, start);
        s.transmission_id = TransmissionId(id);
        s
    }

    fn fire(phy: &mut CsmaPhy, ctx: &mut MockContext) {
        let t = ctx.timers.fire_next().unwrap();
        phy.handle_timer(t, ctx).unwrap();
    }

    #[test]
    fn single_reception_delivered_once() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.handle_signal(inbound(1, 0), &mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Receiving);
        assert_eq!(phy.received_signal().map(|s| s.transmission_id), Some(TransmissionId(1)));
        assert_eq!(ctx.timers.expiry(&PhyTimer::RxChannelIdle), Some(8_640 * PS_PER_NS));

        fire(&mut phy, &mut ctx);
        assert_eq!(phy.state(), PhyState::Idle);

        let delivered: Vec<_> = ctx.indications.iter()
            .filter(|i| matches!(i, PhyIndication::ReceptionEnd(SignalKind::Data, Some(_))))
            .collect();
        assert_eq!(delivered.len(), 1);

        assert_eq!(ctx.indications, std::vec![
            PhyIndication::CarrierSenseStart,
            PhyIndication::ReceptionStart(SignalKind::Data),
            PhyIndication::ReceptionEnd(SignalKind::Data, Some(frame())),
            PhyIndication::CarrierSenseEnd,
        ]);
        assert_eq!(ctx.collisions(), 0);
    }

    #[test]
    fn overlapping_receptions_collide_once() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.handle_signal(inbound(1, 0), &mut ctx).unwrap();

        ctx.timers.set_now(100 * PS_PER_NS);
        phy.handle_signal(inbound(2, 100 * PS_PER_NS), &mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Collision);
        assert_eq!(phy.received_signal(), None);

        // Third overlapping signal does not report again
        ctx.timers.set_now(200 * PS_PER_NS);
        phy.handle_signal(inbound(3, 200 * PS_PER_NS), &mut ctx).unwrap();
        assert_eq!(ctx.collisions(), 1);

        // Idle timer targets the latest end
        assert_eq!(ctx.timers.expiry(&PhyTimer::RxChannelIdle), Some((200 + 8_640) * PS_PER_NS));

        fire(&mut phy, &mut ctx);
        assert_eq!(phy.state(), PhyState::Idle);

        assert_eq!(ctx.count(&PhyIndication::CollisionEnd), 1);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseStart), 1);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseEnd), 1);
        assert!(!ctx.indications.iter().any(|i| matches!(i, PhyIndication::ReceptionEnd(..))));
    }

    #[test]
    fn jam_truncates_transmission() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.start_frame_transmission(frame(), &mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Transmitting);
        let id = phy.transmitted_signal().unwrap().transmission_id;

        // Peer transmission arrives, collision
        ctx.timers.set_now(500 * PS_PER_NS);
        phy.handle_signal(inbound(7, 100 * PS_PER_NS), &mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Collision);
        assert_eq!(ctx.collisions(), 1);

        phy.start_jam_signal_transmission(&mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Collision);

        // Truncation update followed by the jam
        assert_eq!(ctx.sent.len(), 3);
        let update = &ctx.sent[1];
        assert!(update.is_update);
        assert_eq!(update.transmission_id, id);
        assert_eq!(update.duration, 500 * PS_PER_NS);
        assert!(update.bit_error);
        assert_eq!(update.remaining(), 0);

        let jam = &ctx.sent[2];
        assert_eq!(jam.kind, SignalKind::Jam);
        assert_eq!(jam.duration, 320 * PS_PER_NS);

        assert!(ctx.events.contains(&TelemetryEvent::TransmissionEnded { kind: SignalKind::Data, id, truncated: true }));

        // Jam completes before the peer signal
        fire(&mut phy, &mut ctx);
        assert_eq!(phy.state(), PhyState::Collision);
        assert_eq!(ctx.indications.last(), Some(&PhyIndication::TransmissionEnd(SignalKind::Jam, None)));

        fire(&mut phy, &mut ctx);
        assert_eq!(phy.state(), PhyState::Idle);
        assert_eq!(ctx.count(&PhyIndication::CollisionEnd), 1);
    }

    #[test]
    fn truncation_update_shortens_reception() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.handle_signal(inbound(1, 0), &mut ctx).unwrap();

        // Sender cut its signal after 400 ns, update arrives 500 ns later
        let mut update = inbound(1, 0);
        update.cut(400 * PS_PER_NS);
        update.is_update = true;
        update.sent_at = 400 * PS_PER_NS;

        ctx.timers.set_now(900 * PS_PER_NS);
        phy.handle_signal(update, &mut ctx).unwrap();
        assert_eq!(phy.state(), PhyState::Receiving);
        assert_eq!(ctx.timers.expiry(&PhyTimer::RxChannelIdle), Some(900 * PS_PER_NS));

        fire(&mut phy, &mut ctx);

        // Damaged frame is still handed up, without a collision
        match ctx.indications.iter().find(|i| matches!(i, PhyIndication::ReceptionEnd(..))) {
            Some(PhyIndication::ReceptionEnd(SignalKind::Data, Some(f))) => assert!(f.has_bit_error()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ctx.collisions(), 0);
    }

    #[test]
    fn back_to_back_frames_both_delivered() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.handle_signal(inbound(1, 0), &mut ctx).unwrap();

        // Next frame starts 2 ps before the first one ends
        let t = 8_640 * PS_PER_NS - 2;
        ctx.timers.set_now(t);
        phy.handle_signal(inbound(2, t), &mut ctx).unwrap();

        assert_eq!(phy.state(), PhyState::Receiving);
        assert_eq!(ctx.collisions(), 0);
        // Carrier held across the handover
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseStart), 1);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseEnd), 0);

        fire(&mut phy, &mut ctx);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseEnd), 1);

        let delivered = ctx.indications.iter()
            .filter(|i| matches!(i, PhyIndication::ReceptionEnd(SignalKind::Data, Some(_))))
            .count();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn burst_commit_after_frame_holds_carrier() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.handle_signal(inbound(1, 0), &mut ctx).unwrap();

        // Commit starts on the same instant the frame ends
        let t = 8_640 * PS_PER_NS;
        ctx.timers.set_now(t);
        let mut commit = Signal::control(SignalKind::Commit, COMMIT_SIGNAL_MAX_BITS, 100_000_000, t);
        commit.transmission_id = TransmissionId(2);
        phy.handle_signal(commit, &mut ctx).unwrap();

        assert_eq!(phy.state(), PhyState::Receiving);
        assert_eq!(phy.received_signal().map(|s| s.kind), Some(SignalKind::Commit));
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseStart), 1);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseEnd), 0);
        assert!(ctx.indications.iter().any(|i| matches!(i, PhyIndication::ReceptionEnd(SignalKind::Data, Some(_)))));
        assert_eq!(ctx.indications.last(), Some(&PhyIndication::ReceptionStart(SignalKind::Commit)));
    }

    #[test]
    fn commit_after_beacon_drops_carrier() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        let mut beacon = Signal::control(SignalKind::Beacon, BEACON_SIGNAL_BITS, 100_000_000, 0);
        beacon.transmission_id = TransmissionId(1);
        phy.handle_signal(beacon, &mut ctx).unwrap();

        let t = 200 * PS_PER_NS;
        ctx.timers.set_now(t);
        let mut commit = Signal::control(SignalKind::Commit, COMMIT_SIGNAL_MAX_BITS, 100_000_000, t);
        commit.transmission_id = TransmissionId(2);
        phy.handle_signal(commit, &mut ctx).unwrap();

        assert_eq!(phy.state(), PhyState::Receiving);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseStart), 2);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseEnd), 1);
        assert_eq!(ctx.collisions(), 0);
    }

    #[test]
    fn commit_promoted_to_frame() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        phy.start_commit_signal_transmission(&mut ctx).unwrap();
        let id = phy.transmitted_signal().unwrap().transmission_id;

        ctx.timers.set_now(1_000 * PS_PER_NS);
        phy.start_frame_transmission(frame(), &mut ctx).unwrap();

        let tx = phy.transmitted_signal().unwrap();
        assert_eq!(tx.kind, SignalKind::Data);
        assert_eq!(tx.transmission_id, id);

        let update = ctx.sent.last().unwrap();
        assert!(update.is_update);
        assert_eq!(update.remaining(), 8_640 * PS_PER_NS);
        assert_eq!(ctx.timers.expiry(&PhyTimer::TxEnd), Some(9_640 * PS_PER_NS));

        fire(&mut phy, &mut ctx);
        assert_eq!(phy.state(), PhyState::Idle);
        assert_eq!(ctx.indications.last(), Some(&PhyIndication::TransmissionEnd(SignalKind::Data, Some(frame()))));
    }

    #[test]
    fn end_signal_cuts_commit() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        // No-op without a control signal
        phy.end_signal_transmission(&mut ctx).unwrap();
        assert!(ctx.sent.is_empty());

        phy.start_commit_signal_transmission(&mut ctx).unwrap();
        ctx.timers.set_now(100 * PS_PER_NS);
        phy.end_signal_transmission(&mut ctx).unwrap();

        assert_eq!(phy.state(), PhyState::Idle);
        assert!(!ctx.timers.is_pending(&PhyTimer::TxEnd));
        assert_eq!(ctx.sent.last().map(|s| s.duration), Some(100 * PS_PER_NS));
        assert_eq!(ctx.indications.last(), Some(&PhyIndication::TransmissionEnd(SignalKind::Commit, None)));
    }

    #[test]
    fn full_duplex_never_collides() {
        let mut phy = CsmaPhy::new(PhyConfig { full_duplex: true, ..Default::default() });
        let mut ctx = MockContext::new();

        phy.start_frame_transmission(frame(), &mut ctx).unwrap();

        let mut s = inbound(1, 0);
        s.full_duplex = true;
        phy.handle_signal(s, &mut ctx).unwrap();

        assert_eq!(phy.state(), PhyState::Transmitting);
        assert_eq!(ctx.collisions(), 0);
        assert_eq!(ctx.count(&PhyIndication::CarrierSenseStart), 0);

        // Both complete at the same time
        fire(&mut phy, &mut ctx);
        fire(&mut phy, &mut ctx);

        assert!(ctx.indications.contains(&PhyIndication::ReceptionEnd(SignalKind::Data, Some(frame()))));
        assert!(ctx.indications.contains(&PhyIndication::TransmissionEnd(SignalKind::Data, Some(frame()))));
    }

    #[test]
    fn duplex_mismatch_is_fatal() {
        let mut phy = CsmaPhy::new(PhyConfig::default());
        let mut ctx = MockContext::new();

        let mut s = inbound(1, 0);
        s.full_duplex = true;
        assert_eq!(phy.handle_signal(s, &mut ctx), Err(Error::DuplexMismatch));

        let mut phy = CsmaPhy::new(PhyConfig { full_duplex: true, ..Default::default() });
        let mut jam = Signal::control(SignalKind::Jam, 32, 100_000_000, 0);
        jam.full_duplex = true;
        assert_eq!(phy.handle_signal(jam, &mut ctx), Err(Error::StrayJamSignal));
    }
}

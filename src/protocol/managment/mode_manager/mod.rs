//! MILCAN A operating modes and the per-tick orchestration of the sync
//! engine and the config-mode handshake.
//!
//! ```text
//! PowerOff ──► PreOperational ──(master held for a slave timeout)──► Operational
//!                  ▲    │  ▲                                            │
//!                  │   CFG │ OPR / 8 s without refresh                  │
//!                  │    ▼  │                                            │
//!                  │ SystemConfiguration ◄──────────────CFG─────────────┤
//!                  └──────────────────── 8 PTU without sync ────────────┘
//! ```
//!
//! [`ModeManager::tick`] is pure with respect to I/O: frames to transmit and
//! notifications for the application are collected in an [`Outbox`].
use embassy_time::Instant;
use tracing::{debug, info, trace, warn};

use crate::protocol::managment::config_handshake::{
    HandshakeSender, Sequence, SequenceTracker, TrackResult,
};
use crate::protocol::managment::session::{SessionConfig, SessionOptions};
use crate::protocol::managment::sync_timing::{SyncEngine, SyncTiming};
use crate::protocol::transport::can_frame::{
    enter_config_frame, exit_config_frame, CanFrame, Frame,
};
use crate::protocol::transport::can_id::ControlKind;
use crate::protocol::transport::CONFIG_MODE_TIMEOUT;

//==================================================================================MODE
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
/// Operating mode of a node.
pub enum Mode {
    #[default]
    PowerOff = 0,
    PreOperational = 1,
    Operational = 2,
    SystemConfiguration = 3,
}

//==================================================================================OUTBOX
/// Side effects of one tick.
#[derive(Debug, Default)]
pub struct Outbox {
    /// Control frames to put on the bus, in order.
    pub transmit: Vec<CanFrame>,
    /// Notifications and delivered frames for the inbound queue, in order.
    pub events: Vec<Frame>,
}

impl Outbox {
    pub fn clear(&mut self) {
        self.transmit.clear();
        self.events.clear();
    }
}

//==================================================================================MODE_MANAGER
/// Protocol state of one session, driven exclusively by the session runner.
#[derive(Debug)]
pub struct ModeManager {
    source_address: u8,
    options: SessionOptions,
    mode: Mode,
    sync: SyncEngine,
    /// PreOperational: promotion once a master is held. Operational: sync
    /// watchdog. SystemConfiguration: exit without refresh.
    mode_exit_deadline: Option<Instant>,
    enter_tracker: SequenceTracker,
    exit_tracker: SequenceTracker,
    enter_sender: HandshakeSender,
    exit_sender: HandshakeSender,
}

impl ModeManager {
    /// New node in `PowerOff`; the first tick moves it to `PreOperational`.
    pub fn new(config: &SessionConfig, now: Instant) -> Self {
        let timing = SyncTiming::new(config.speed(), config.sync_frequency_hz());
        Self {
            source_address: config.source_address(),
            options: config.options(),
            mode: Mode::PowerOff,
            sync: SyncEngine::new(
                config.source_address(),
                config.options().contains(SessionOptions::CAN_BE_SYNC_MASTER),
                timing,
                now,
            ),
            mode_exit_deadline: None,
            enter_tracker: SequenceTracker::new(Sequence::Enter),
            exit_tracker: SequenceTracker::new(Sequence::Exit),
            enter_sender: HandshakeSender::new(Sequence::Enter),
            exit_sender: HandshakeSender::new(Sequence::Exit),
        }
    }

    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sync_counter(&self) -> u16 {
        self.sync.counter()
    }

    pub fn sync_master(&self) -> Option<u8> {
        self.sync.master()
    }

    pub fn timing(&self) -> SyncTiming {
        self.sync.timing()
    }

    /// Application traffic leaves the transmit queue only in these modes.
    pub fn drains_tx_queue(&self) -> bool {
        matches!(self.mode, Mode::Operational | Mode::SystemConfiguration)
    }

    /// Start sending `'C' 'F' 'G'`, repeated every second until the mode changes.
    pub fn request_enter_configuration(&mut self, now: Instant) {
        debug!(source = self.source_address, "enter-config requested");
        self.enter_sender.request(now);
    }

    /// Send `'O' 'P' 'R'` once. Only meaningful in `SystemConfiguration`.
    pub fn request_exit_configuration(&mut self, now: Instant) {
        if self.mode == Mode::SystemConfiguration {
            debug!(source = self.source_address, "exit-config requested");
            self.exit_sender.request(now);
        } else {
            debug!(mode = ?self.mode, "exit-config requested outside configuration mode, ignored");
        }
    }

    //==================================================================================TICK
    /// Advance the state machine to `now`, handling at most one received frame.
    pub fn tick(&mut self, now: Instant, inbound: Option<&CanFrame>, out: &mut Outbox) {
        if self.mode == Mode::PowerOff {
            self.enter_pre_operational(now, out);
        }
        if let Some(frame) = inbound {
            self.handle_frame(now, frame, out);
        }
        self.handle_timers(now, out);
    }

    fn handle_frame(&mut self, now: Instant, frame: &CanFrame, out: &mut Outbox) {
        let source = frame.id.source_address();
        if source == self.source_address {
            trace!(id = %frame.id, "dropping own frame from the bus");
            return;
        }

        let Some(kind) = frame.id.control_kind() else {
            match self.mode {
                Mode::Operational | Mode::SystemConfiguration => {
                    out.events.push(Frame::Message(*frame))
                }
                _ => trace!(mode = ?self.mode, id = %frame.id, "discarding frame"),
            }
            return;
        };

        if self.options.contains(SessionOptions::DELIVER_CONTROL_FRAMES) {
            out.events.push(Frame::Message(*frame));
        }

        match kind {
            ControlKind::Sync => {
                if self.mode == Mode::SystemConfiguration {
                    return;
                }
                let Some(counter) = frame.sync_counter() else {
                    debug!(source, "malformed sync frame");
                    return;
                };
                if self.sync.observe(now, source, counter, out) {
                    self.sync_seen(now);
                }
            }
            ControlKind::EnterConfig => match frame.payload().first() {
                Some(&byte) => self.on_enter_byte(now, source, byte, out),
                None => debug!(source, "empty enter-config frame"),
            },
            ControlKind::ExitConfig => match frame.payload().first() {
                Some(&byte) => self.on_exit_byte(now, source, byte, out),
                None => debug!(source, "empty exit-config frame"),
            },
        }
    }

    fn handle_timers(&mut self, now: Instant, out: &mut Outbox) {
        match self.mode {
            Mode::PowerOff => {}
            Mode::PreOperational => {
                self.run_sync(now, out);
                if self.sync.master().is_some() && self.sync.sync_lost(now) {
                    info!(master = ?self.sync.master(), "sync master lost");
                    self.sync.reset(now, out);
                    self.mode_exit_deadline = None;
                } else if self.sync.master().is_some()
                    && self.mode_exit_deadline.is_some_and(|deadline| now >= deadline)
                {
                    self.enter_operational(now, out);
                }
                self.run_enter_sender(now, out);
            }
            Mode::Operational => {
                self.run_sync(now, out);
                if self.mode_exit_deadline.is_some_and(|deadline| now >= deadline) {
                    warn!(source = self.source_address, "no sync within watchdog");
                    self.enter_pre_operational(now, out);
                    return;
                }
                self.run_enter_sender(now, out);
            }
            Mode::SystemConfiguration => {
                if self.mode_exit_deadline.is_some_and(|deadline| now >= deadline) {
                    info!(source = self.source_address, "configuration mode timed out");
                    self.enter_pre_operational(now, out);
                    return;
                }
                self.run_enter_sender(now, out);
                self.run_exit_sender(now, out);
            }
        }
    }

    //==================================================================================SYNC
    fn run_sync(&mut self, now: Instant, out: &mut Outbox) {
        if let Some(frame) = self.sync.poll(now, out) {
            self.transmit_control(frame, out);
            self.sync_seen(now);
        }
    }

    /// A sync frame, own or accepted, went over the bus.
    fn sync_seen(&mut self, now: Instant) {
        match self.mode {
            Mode::PreOperational if self.mode_exit_deadline.is_none() => {
                self.mode_exit_deadline = Some(now + self.sync.timing().slave_timeout());
            }
            Mode::Operational => {
                self.mode_exit_deadline = Some(now + self.sync.timing().watchdog());
            }
            _ => {}
        }
    }

    //==================================================================================HANDSHAKE
    fn on_enter_byte(&mut self, now: Instant, source: u8, byte: u8, out: &mut Outbox) {
        if self.tracker_result(now, Sequence::Enter, source, byte) != TrackResult::Complete {
            return;
        }
        if source == self.source_address {
            self.enter_sender.cancel();
        }
        if self.mode == Mode::SystemConfiguration {
            debug!(source, "configuration mode refreshed");
            self.mode_exit_deadline = Some(now + CONFIG_MODE_TIMEOUT);
        } else {
            self.enter_system_configuration(now, out);
        }
    }

    fn on_exit_byte(&mut self, now: Instant, source: u8, byte: u8, out: &mut Outbox) {
        if self.mode != Mode::SystemConfiguration {
            return;
        }
        if self.tracker_result(now, Sequence::Exit, source, byte) == TrackResult::Complete {
            info!(source, "exit-config sequence received");
            self.enter_pre_operational(now, out);
        }
    }

    fn tracker_result(&mut self, now: Instant, sequence: Sequence, source: u8, byte: u8) -> TrackResult {
        let tracker = match sequence {
            Sequence::Enter => &mut self.enter_tracker,
            Sequence::Exit => &mut self.exit_tracker,
        };
        tracker.process_byte(now, source, byte)
    }

    fn run_enter_sender(&mut self, now: Instant, out: &mut Outbox) {
        let ptu = self.sync.timing().ptu();
        if let Some(byte) = self.enter_sender.poll(now, ptu) {
            debug!(byte = %char::from(byte), "sending enter-config byte");
            self.transmit_control(enter_config_frame(self.source_address, byte), out);
            // Own bytes count towards the sequence like any other node's.
            self.on_enter_byte(now, self.source_address, byte, out);
        }
    }

    fn run_exit_sender(&mut self, now: Instant, out: &mut Outbox) {
        let ptu = self.sync.timing().ptu();
        if let Some(byte) = self.exit_sender.poll(now, ptu) {
            debug!(byte = %char::from(byte), "sending exit-config byte");
            self.transmit_control(exit_config_frame(self.source_address, byte), out);
            self.on_exit_byte(now, self.source_address, byte, out);
            if self.exit_sender.is_finished() {
                self.exit_sender.cancel();
                if self.mode == Mode::SystemConfiguration {
                    self.enter_pre_operational(now, out);
                }
            }
        }
    }

    fn transmit_control(&mut self, frame: CanFrame, out: &mut Outbox) {
        out.transmit.push(frame);
        if self
            .options
            .contains(SessionOptions::ECHO_OWN_FRAMES | SessionOptions::DELIVER_CONTROL_FRAMES)
        {
            out.events.push(Frame::Message(frame));
        }
    }

    //==================================================================================TRANSITIONS
    fn set_mode(&mut self, mode: Mode, out: &mut Outbox) {
        if self.mode != mode {
            info!(source = self.source_address, from = ?self.mode, to = ?mode, "mode changed");
            self.mode = mode;
            out.events.push(Frame::ModeChanged(mode));
        }
    }

    fn enter_pre_operational(&mut self, now: Instant, out: &mut Outbox) {
        self.set_mode(Mode::PreOperational, out);
        self.sync.reset(now, out);
        self.mode_exit_deadline = None;
        self.enter_tracker.reset();
        self.exit_tracker.reset();
        self.exit_sender.cancel();
    }

    fn enter_operational(&mut self, now: Instant, out: &mut Outbox) {
        self.set_mode(Mode::Operational, out);
        self.mode_exit_deadline = Some(now + self.sync.timing().watchdog());
    }

    fn enter_system_configuration(&mut self, now: Instant, out: &mut Outbox) {
        self.set_mode(Mode::SystemConfiguration, out);
        self.mode_exit_deadline = Some(now + CONFIG_MODE_TIMEOUT);
        self.enter_sender.cancel();
        self.exit_tracker.reset();
    }
}

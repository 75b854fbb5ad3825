//! Session shell around [`ModeManager`]: owns the inbound notification queue
//! and the transmit queue, and runs the protocol loop as a background task.
//!
//! * [`Session::send`] only enqueues; frames reach the bus from the runner.
//! * [`Session::recv`] pops the oldest notification, `None` when empty.
//! * [`Session::close`] stops the runner and joins it before returning.
//!
//! The application never touches the bus directly: the runner polls it,
//! feeds the [`ModeManager`], transmits what the manager asks for, and drains
//! the transmit queue one frame per iteration while the mode allows it.
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use std::sync::Arc;

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    channel::Channel,
    signal::Signal,
};
use embassy_time::Duration;
use futures_util::{future::select, future::Either, pin_mut};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{BusError, SendError, SessionError};
use crate::protocol::managment::mode_manager::{Mode, ModeManager, Outbox};
use crate::protocol::transport::can_frame::{CanFrame, Frame, MilcanFrame};
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::clock::{MilcanClock, SystemClock};
use crate::protocol::transport::tx_queue::TxQueue;
use crate::protocol::transport::MAX_INBOUND_FRAMES;

mod config;
pub use config::{SessionConfig, SessionConfigBuilder, SessionOptions};

/// Pending handshake requests from the application.
const COMMAND_CAP: usize = 4;

//==================================================================================Enums and Structs
/// Commands queued by the application for the runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    EnterConfiguration,
    ExitConfiguration,
}

/// Snapshot of the protocol state, refreshed by the runner every iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub mode: Mode,
    pub sync_counter: u16,
    pub sync_master: Option<u8>,
}

/// State shared between the application handle and the runner.
struct Shared {
    inbound: Channel<CriticalSectionRawMutex, Frame, MAX_INBOUND_FRAMES>,
    commands: Channel<CriticalSectionRawMutex, SessionCommand, COMMAND_CAP>,
    tx_queue: Mutex<CriticalSectionRawMutex, RefCell<TxQueue>>,
    status: Mutex<CriticalSectionRawMutex, Cell<SessionStatus>>,
    stop: Signal<CriticalSectionRawMutex, ()>,
}

impl Shared {
    fn new() -> Self {
        Self {
            inbound: Channel::new(),
            commands: Channel::new(),
            tx_queue: Mutex::new(RefCell::new(TxQueue::new())),
            status: Mutex::new(Cell::new(SessionStatus::default())),
            stop: Signal::new(),
        }
    }

    /// Push to the inbound queue; when full the new entry is dropped.
    fn publish(&self, frame: Frame) {
        if self.inbound.try_send(frame).is_err() {
            warn!(?frame, "inbound queue full, dropping notification");
        }
    }
}

//==================================================================================SESSION
/// Application handle of one open MILCAN connection.
pub struct Session<C: CanBus, K: MilcanClock = SystemClock> {
    shared: Arc<Shared>,
    clock: K,
    source_address: u8,
    task: Option<JoinHandle<Result<(), SessionError<C::Error>>>>,
    _bus: PhantomData<fn() -> C>,
}

impl<C> Session<C, SystemClock>
where
    C: CanBus + Send + 'static,
{
    /// Open a session on `bus` using the host monotonic clock.
    ///
    /// Must be called from within a Tokio runtime, which runs the protocol loop.
    pub fn open(bus: C, config: SessionConfig) -> Result<Self, SessionError<C::Error>> {
        Self::open_with_clock(bus, config, SystemClock)
    }
}

impl<C, K> Session<C, K>
where
    C: CanBus + Send + 'static,
    K: MilcanClock,
{
    /// Open a session driven by a custom clock.
    pub fn open_with_clock(
        bus: C,
        config: SessionConfig,
        clock: K,
    ) -> Result<Self, SessionError<C::Error>> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let shared = Arc::new(Shared::new());
        let runner = SessionRunner {
            bus,
            clock: clock.clone(),
            manager: ModeManager::new(&config, clock.now()),
            shared: Arc::clone(&shared),
            outbox: Outbox::default(),
            echo_own_frames: config.options().contains(SessionOptions::ECHO_OWN_FRAMES),
        };

        info!(
            source = config.source_address(),
            speed = ?config.speed(),
            sync_hz = config.sync_frequency_hz(),
            options = ?config.options(),
            "opening session"
        );
        let task = runtime.spawn(runner.drive());

        Ok(Self {
            shared,
            clock,
            source_address: config.source_address(),
            task: Some(task),
            _bus: PhantomData,
        })
    }

    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Queue a frame for transmission. Never waits for the bus.
    pub fn send(&self, frame: impl Into<MilcanFrame>) -> Result<(), SendError> {
        if !self.is_running() {
            return Err(SendError::Closed);
        }
        let now = self.clock.now();
        let frame = frame.into();
        self.shared
            .tx_queue
            .lock(|queue| queue.borrow_mut().enqueue(frame, now))
    }

    /// Oldest pending notification or received frame.
    pub fn recv(&self) -> Option<Frame> {
        self.shared.inbound.try_receive().ok()
    }

    /// Wait up to `timeout` for the next notification.
    pub async fn recv_within(&self, timeout: Duration) -> Option<Frame> {
        let receive = self.shared.inbound.receive();
        let timer = tokio::time::sleep(core::time::Duration::from_micros(timeout.as_micros()));
        pin_mut!(receive);
        pin_mut!(timer);

        match select(receive, timer).await {
            Either::Left((frame, _)) => Some(frame),
            Either::Right(_) => None,
        }
    }

    /// Start the `'C' 'F' 'G'` handshake towards System Configuration.
    pub fn change_to_config_mode(&self) -> Result<(), SendError> {
        self.command(SessionCommand::EnterConfiguration)
    }

    /// Send `'O' 'P' 'R'` to bring the network back to PreOperational.
    pub fn exit_configuration_mode(&self) -> Result<(), SendError> {
        self.command(SessionCommand::ExitConfiguration)
    }

    fn command(&self, command: SessionCommand) -> Result<(), SendError> {
        if !self.is_running() {
            return Err(SendError::Closed);
        }
        self.shared
            .commands
            .try_send(command)
            .map_err(|_| SendError::ResourceExhausted)
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.lock(Cell::get)
    }

    pub fn mode(&self) -> Mode {
        self.status().mode
    }

    /// Log the current state at `info` level and return the mode.
    pub fn display_mode(&self) -> Mode {
        let status = self.status();
        info!(
            source = self.source_address,
            mode = ?status.mode,
            sync_counter = status.sync_counter,
            sync_master = ?status.sync_master,
            "session status"
        );
        status.mode
    }

    /// `false` once the runner stopped, on `close` or after a fatal transport error.
    pub fn is_running(&self) -> bool {
        !self.shared.stop.signaled() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the runner, wait for it, and report how it ended.
    pub async fn close(mut self) -> Result<(), SessionError<C::Error>> {
        self.shared.stop.signal(());
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(source = self.source_address, %err, "session task aborted");
                Err(SessionError::Aborted)
            }
        }
    }
}

impl<C: CanBus, K: MilcanClock> Drop for Session<C, K> {
    fn drop(&mut self) {
        self.shared.stop.signal(());
    }
}

//==================================================================================SESSION_RUNNER
/// Background protocol loop of a session.
struct SessionRunner<C: CanBus, K: MilcanClock> {
    bus: C,
    clock: K,
    manager: ModeManager,
    shared: Arc<Shared>,
    outbox: Outbox,
    echo_own_frames: bool,
}

impl<C, K> SessionRunner<C, K>
where
    C: CanBus,
    K: MilcanClock,
{
    async fn drive(mut self) -> Result<(), SessionError<C::Error>> {
        let result = self.run().await;
        self.bus.close();
        match &result {
            Ok(()) => info!(source = self.manager.source_address(), "session stopped"),
            Err(err) => error!(source = self.manager.source_address(), %err, "session ended"),
        }
        result
    }

    fn publish_status(&self) {
        let status = SessionStatus {
            mode: self.manager.mode(),
            sync_counter: self.manager.sync_counter(),
            sync_master: self.manager.sync_master(),
        };
        self.shared.status.lock(|cell| cell.set(status));
    }

    async fn run(&mut self) -> Result<(), SessionError<C::Error>> {
        loop {
            if self.shared.stop.signaled() {
                return Ok(());
            }
            let now = self.clock.now();

            while let Ok(command) = self.shared.commands.try_receive() {
                match command {
                    SessionCommand::EnterConfiguration => {
                        self.manager.request_enter_configuration(now)
                    }
                    SessionCommand::ExitConfiguration => {
                        self.manager.request_exit_configuration(now)
                    }
                }
            }

            let inbound = match self.bus.try_recv() {
                Ok(frame) => frame,
                Err(BusError::Recoverable { reason }) => {
                    warn!(reason, "dropping unreadable frame");
                    None
                }
                Err(BusError::Fatal(err)) => {
                    error!(?err, "transport failed while receiving");
                    return Err(SessionError::Transport(err));
                }
            };
            let mut busy = inbound.is_some();

            self.outbox.clear();
            self.manager.tick(now, inbound.as_ref(), &mut self.outbox);
            // Visible before the notifications describing it.
            self.publish_status();
            for frame in &self.outbox.transmit {
                busy = true;
                transmit(&mut self.bus, frame).await?;
            }
            for event in self.outbox.events.drain(..) {
                self.shared.publish(event);
            }

            if self.manager.drains_tx_queue() {
                let next = self
                    .shared
                    .tx_queue
                    .lock(|queue| queue.borrow_mut().dequeue(now));
                if let Some(frame) = next {
                    busy = true;
                    if transmit(&mut self.bus, &frame).await? && self.echo_own_frames {
                        self.shared.publish(Frame::Message(frame));
                    }
                }
            }

            if !busy {
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Put one frame on the bus. `Ok(false)` when the transport dropped it.
async fn transmit<C: CanBus>(bus: &mut C, frame: &CanFrame) -> Result<bool, SessionError<C::Error>> {
    match bus.send(frame).await {
        Ok(()) => Ok(true),
        Err(BusError::Recoverable { reason }) => {
            warn!(reason, id = %frame.id, "frame dropped by transport");
            Ok(false)
        }
        Err(BusError::Fatal(err)) => {
            error!(?err, "transport failed while sending");
            Err(SessionError::Transport(err))
        }
    }
}

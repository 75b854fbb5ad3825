/// Test doubles to simulate a multi-drop CAN bus and a controllable clock
/// during integration tests.
use embassy_time::Instant;
use korri_milcan::error::BusError;
use korri_milcan::protocol::managment::session::Session;
use korri_milcan::protocol::transport::{
    can_frame::{CanFrame, Frame},
    traits::{can_bus::CanBus, clock::MilcanClock},
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Duration;

#[allow(dead_code)]
/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//==================================================================================VIRTUAL_BUS
#[derive(Clone, Default)]
#[allow(dead_code)]
/// In-memory CAN segment: every frame sent by one port reaches all the others.
pub struct VirtualBus {
    ports: Arc<Mutex<Vec<(usize, mpsc::UnboundedSender<CanFrame>)>>>,
    next_port: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new node (or a passive tap) to the segment.
    pub fn attach(&self) -> VirtualPort {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_port.fetch_add(1, Ordering::Relaxed);
        self.ports.lock().unwrap().push((id, tx));
        VirtualPort {
            id,
            bus: self.clone(),
            rx,
        }
    }

    fn broadcast(&self, from: usize, frame: &CanFrame) {
        for (id, tx) in self.ports.lock().unwrap().iter() {
            if *id != from {
                let _ = tx.send(*frame);
            }
        }
    }

    fn detach(&self, port: usize) {
        self.ports.lock().unwrap().retain(|(id, _)| *id != port);
    }
}

#[allow(dead_code)]
/// One connection to a [`VirtualBus`].
pub struct VirtualPort {
    id: usize,
    bus: VirtualBus,
    rx: mpsc::UnboundedReceiver<CanFrame>,
}

#[allow(dead_code)]
impl VirtualPort {
    /// Inject a frame as if this port's node sent it.
    pub fn inject(&self, frame: &CanFrame) {
        self.bus.broadcast(self.id, frame);
    }

    /// Wait for the next frame seen by this port.
    pub async fn recv_within(&mut self, timeout: Duration) -> Option<CanFrame> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

#[derive(Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum VirtualBusError {
    Disconnected,
}

impl CanBus for VirtualPort {
    type Error = VirtualBusError;

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), BusError<Self::Error>> {
        self.bus.broadcast(self.id, frame);
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<CanFrame>, BusError<Self::Error>> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Fatal(VirtualBusError::Disconnected)),
        }
    }

    fn close(&mut self) {
        self.bus.detach(self.id);
    }
}

//==================================================================================FAILING_BUS
#[allow(dead_code)]
/// Transport returning recoverable read errors, then failing for good.
pub struct FailingBus {
    pub recoverable_polls: usize,
}

impl CanBus for FailingBus {
    type Error = &'static str;

    async fn send<'a>(&'a mut self, _frame: &'a CanFrame) -> Result<(), BusError<Self::Error>> {
        Err(BusError::Recoverable { reason: "tx buffer full" })
    }

    fn try_recv(&mut self) -> Result<Option<CanFrame>, BusError<Self::Error>> {
        if self.recoverable_polls > 0 {
            self.recoverable_polls -= 1;
            return Err(BusError::Recoverable { reason: "short read" });
        }
        Err(BusError::Fatal("adapter unplugged"))
    }
}

//==================================================================================MANUAL_CLOCK
#[derive(Clone, Default)]
#[allow(dead_code)]
/// Clock that only moves when the test advances it.
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl MilcanClock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

//==================================================================================WAITERS
#[allow(dead_code)]
/// Drain notifications until one matches `pred`. `false` on timeout.
pub async fn wait_for<C, K>(
    session: &Session<C, K>,
    timeout: Duration,
    mut pred: impl FnMut(&Frame) -> bool,
) -> bool
where
    C: CanBus + Send + 'static,
    K: MilcanClock,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        let remaining = embassy_time::Duration::from_micros(remaining.as_micros() as u64);
        match session.recv_within(remaining).await {
            Some(frame) if pred(&frame) => return true,
            Some(_) => {}
            None => return false,
        }
    }
}

#[allow(dead_code)]
/// Poll `cond` every millisecond. `false` on timeout.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    cond()
}

#[allow(dead_code)]
/// Discard every pending notification.
pub fn drain<C, K>(session: &Session<C, K>)
where
    C: CanBus + Send + 'static,
    K: MilcanClock,
{
    while session.recv().is_some() {}
}

//! Shared time base of a MILCAN network: PTU computation, sync master
//! election and periodic sync transmission.
//!
//! The node with the lowest source address among those allowed to be sync
//! master wins. A candidate preempts a weaker (or missing) master by sending
//! its own sync at 80% of the PTU, before the current master's 100%.
use embassy_time::{Duration, Instant};
use tracing::{info, trace};

use crate::protocol::managment::mode_manager::Outbox;
use crate::protocol::transport::can_frame::{sync_frame, CanFrame, Frame};
use crate::protocol::transport::{duration_from_nanos, BusSpeed, SYNC_WATCHDOG_PTUS};

/// Sync counters are 10 bits wide.
pub const SYNC_COUNTER_MODULO: u16 = 1024;

//==================================================================================SYNC_TIMING
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Durations derived from the bus speed and sync frequency.
pub struct SyncTiming {
    ptu: Duration,
    slave_timeout: Duration,
}

impl SyncTiming {
    /// PTU = 1e9 / `sync_frequency_hz` ns; slave timeout = PTU + two maximum-length frames.
    ///
    /// `sync_frequency_hz` must be non-zero; session configuration enforces it.
    pub fn new(speed: BusSpeed, sync_frequency_hz: u16) -> Self {
        let ptu_ns = 1_000_000_000u64.div_ceil(u64::from(sync_frequency_hz.max(1)));
        let slave_ns = ptu_ns + 2 * speed.max_frame_time_ns();
        Self {
            ptu: duration_from_nanos(ptu_ns),
            slave_timeout: duration_from_nanos(slave_ns),
        }
    }

    /// Primary Time Unit: the sync period.
    pub fn ptu(&self) -> Duration {
        self.ptu
    }

    /// Silence after which a slave considers the master gone.
    pub fn slave_timeout(&self) -> Duration {
        self.slave_timeout
    }

    /// Silence after which Operational falls back to PreOperational.
    pub fn watchdog(&self) -> Duration {
        self.ptu * SYNC_WATCHDOG_PTUS
    }

    /// How early a candidate fires before the PTU deadline (20%).
    pub fn preempt_lead(&self) -> Duration {
        self.ptu / 5
    }
}

//==================================================================================SYNC_ENGINE
/// Election and sync emission state of one node.
#[derive(Debug)]
pub struct SyncEngine {
    source_address: u8,
    can_be_master: bool,
    timing: SyncTiming,
    counter: u16,
    master: Option<u8>,
    /// Next sync is due at this instant (100% of the PTU).
    deadline: Instant,
    last_sync: Instant,
}

impl SyncEngine {
    pub fn new(source_address: u8, can_be_master: bool, timing: SyncTiming, now: Instant) -> Self {
        Self {
            source_address,
            can_be_master,
            timing,
            counter: 0,
            master: None,
            deadline: now + timing.ptu(),
            last_sync: now,
        }
    }

    pub fn timing(&self) -> SyncTiming {
        self.timing
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Current sync master, `None` when the election is open.
    pub fn master(&self) -> Option<u8> {
        self.master
    }

    pub fn is_master(&self) -> bool {
        self.master == Some(self.source_address)
    }

    /// Forget the master and restart the PTU from `now`.
    pub fn reset(&mut self, now: Instant, out: &mut Outbox) {
        self.set_master(None, out);
        self.deadline = now + self.timing.ptu();
        self.last_sync = now;
    }

    /// `true` once a slave has heard nothing for a full slave timeout.
    pub fn sync_lost(&self, now: Instant) -> bool {
        !self.is_master() && now >= self.last_sync + self.timing.slave_timeout()
    }

    /// Handle a sync frame from another node.
    ///
    /// Returns `false` when the sender ranks below the current master and the
    /// frame is ignored.
    pub fn observe(&mut self, now: Instant, source_address: u8, counter: u16, out: &mut Outbox) -> bool {
        if self.master.is_some_and(|master| source_address > master) {
            trace!(source = source_address, "ignoring sync from lower-priority node");
            return false;
        }
        if self.is_master() {
            info!(
                own = self.source_address,
                winner = source_address,
                "relinquishing sync master"
            );
        }
        self.set_master(Some(source_address), out);
        self.set_counter(counter % SYNC_COUNTER_MODULO, out);
        self.deadline = now + self.timing.ptu();
        self.last_sync = now;
        true
    }

    /// Transmit a sync when this node is master and the PTU elapsed, or when it
    /// may preempt and 80% of the PTU elapsed.
    pub fn poll(&mut self, now: Instant, out: &mut Outbox) -> Option<CanFrame> {
        let due = if self.is_master() {
            now >= self.deadline
        } else if self.can_be_master
            && self.master.map_or(true, |master| self.source_address < master)
        {
            now + self.timing.preempt_lead() >= self.deadline
        } else {
            false
        };
        if !due {
            return None;
        }

        if !self.is_master() {
            info!(source = self.source_address, previous = ?self.master, "claiming sync master");
            self.set_master(Some(self.source_address), out);
        }
        self.set_counter((self.counter + 1) % SYNC_COUNTER_MODULO, out);
        self.deadline = now + self.timing.ptu();
        self.last_sync = now;
        trace!(source = self.source_address, counter = self.counter, "sync transmitted");
        Some(sync_frame(self.source_address, self.counter))
    }

    fn set_master(&mut self, master: Option<u8>, out: &mut Outbox) {
        if self.master != master {
            self.master = master;
            out.events.push(Frame::SyncMasterChanged(master));
        }
    }

    fn set_counter(&mut self, counter: u16, out: &mut Outbox) {
        if self.counter != counter {
            self.counter = counter;
            out.events.push(Frame::SyncUpdated(counter));
        }
    }
}

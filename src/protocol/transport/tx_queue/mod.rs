//! Eight-lane transmit queue: one lane per priority, each sorted by the full
//! identifier, with lazy expiry of mortal frames.
use std::collections::VecDeque;

use embassy_time::Instant;
use tracing::debug;

use crate::error::SendError;
use crate::protocol::transport::can_frame::{CanFrame, MilcanFrame};
use crate::protocol::transport::can_id::CanId;

//==================================================================================Constants

/// One lane per value of the 3-bit priority field.
pub const PRIORITY_LANES: usize = 8;

//==================================================================================Enums and Structs
#[derive(Debug, Clone, Copy)]
struct QueuedFrame {
    frame: CanFrame,
    /// Absolute expiry for mortal frames.
    deadline: Option<Instant>,
}

impl QueuedFrame {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.map_or(true, |deadline| deadline > now)
    }
}

/// Outbound frames waiting for the bus.
#[derive(Debug, Default)]
pub struct TxQueue {
    lanes: [VecDeque<QueuedFrame>; PRIORITY_LANES],
}

impl TxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `frame`, turning its time-to-live into a deadline relative to `now`.
    ///
    /// A time-to-live reaching past the clock range makes the frame immortal.
    /// Frames with equal identifiers keep their insertion order.
    pub fn enqueue(&mut self, frame: MilcanFrame, now: Instant) -> Result<(), SendError> {
        let mut queued = QueuedFrame {
            frame: frame.frame,
            deadline: frame.time_to_live.and_then(|ttl| now.checked_add(ttl)),
        };
        queued.frame.id = CanId(queued.frame.id.raw());
        let key = queued.frame.id.0;

        let lane = &mut self.lanes[queued.frame.id.priority() as usize];
        lane.try_reserve(1)
            .map_err(|_| SendError::ResourceExhausted)?;
        let index = lane.partition_point(|entry| entry.frame.id.0 <= key);
        lane.insert(index, queued);
        Ok(())
    }

    /// Next live frame: lowest priority value first, then lowest identifier.
    ///
    /// Expired frames met on the way are dropped.
    pub fn dequeue(&mut self, now: Instant) -> Option<CanFrame> {
        for (priority, lane) in self.lanes.iter_mut().enumerate() {
            while let Some(entry) = lane.pop_front() {
                if entry.is_live(now) {
                    return Some(entry.frame);
                }
                debug!(priority, id = %entry.frame.id, "dropping expired frame");
            }
        }
        None
    }

    /// Number of queued frames, expired ones included.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}

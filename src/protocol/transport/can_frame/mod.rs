//! In-memory representation of a MILCAN CAN frame, the outbound frame with
//! its optional time-to-live, and the notification union handed to the
//! application.
use core::fmt;

use embassy_time::Duration;
use embedded_can::{ExtendedId, Id};

use crate::error::FrameError;
use crate::protocol::managment::mode_manager::Mode;
use crate::protocol::transport::can_id::{secondary, CanId};

//==================================================================================CAN_FRAME
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Raw MILCAN frame as read from or written to the CAN bus. Always extended.
pub struct CanFrame {
    /// Full 29-bit CAN identifier stored inside a `u32`.
    pub id: CanId,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Copies `payload` into a new frame.
    pub fn new(id: CanId, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > 8 {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            data,
            len: payload.len(),
        })
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(8)]
    }

    /// `true` for sync and config-mode frames.
    pub fn is_control(&self) -> bool {
        self.id.control_kind().is_some()
    }

    /// Sync counter carried by a sync frame, masked to 10 bits.
    ///
    /// `None` when the payload is too short to hold one.
    pub fn sync_counter(&self) -> Option<u16> {
        match self.payload() {
            [low, high, ..] => Some(((*high as u16 & 0x03) << 8) | *low as u16),
            _ => None,
        }
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.len)?;
        for byte in self.payload() {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

impl embedded_can::Frame for CanFrame {
    /// Only extended identifiers are accepted.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Extended(id) => CanFrame::new(CanId(id.as_raw()), data).ok(),
            Id::Standard(_) => None,
        }
    }

    /// Remote frames do not exist in MILCAN.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        match ExtendedId::new(self.id.raw()) {
            Some(id) => Id::Extended(id),
            None => Id::Extended(ExtendedId::ZERO),
        }
    }

    fn dlc(&self) -> usize {
        self.payload().len()
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

//==================================================================================MILCAN_FRAME
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Outbound frame handed to a session, optionally mortal.
pub struct MilcanFrame {
    pub frame: CanFrame,
    /// Relative lifetime; the frame is discarded unsent once it elapses.
    pub time_to_live: Option<Duration>,
}

impl MilcanFrame {
    /// Immortal frame.
    pub fn new(frame: CanFrame) -> Self {
        Self {
            frame,
            time_to_live: None,
        }
    }

    /// Drops the frame from the transmit queue if still queued after `ttl`.
    pub fn mortal(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

impl From<CanFrame> for MilcanFrame {
    fn from(frame: CanFrame) -> Self {
        Self::new(frame)
    }
}

//==================================================================================FRAME
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Entry of the inbound queue: a wire frame or a synthetic notification.
pub enum Frame {
    /// Frame received from the bus (or echoed locally).
    Message(CanFrame),
    /// The session entered a new operating mode.
    ModeChanged(Mode),
    /// The sync counter changed.
    SyncUpdated(u16),
    /// A different node (or none) is now sync master.
    SyncMasterChanged(Option<u8>),
}

//==================================================================================CONTROL_FRAMES
/// Sync frame carrying the 10-bit `counter`.
pub fn sync_frame(source_address: u8, counter: u16) -> CanFrame {
    let mut data = [0u8; 8];
    data[0] = (counter & 0xFF) as u8;
    data[1] = ((counter >> 8) & 0x03) as u8;
    CanFrame {
        id: CanId::system_management(secondary::SYNC, source_address),
        data,
        len: 2,
    }
}

/// One byte of the `'C' 'F' 'G'` Enter-Config sequence.
pub fn enter_config_frame(source_address: u8, byte: u8) -> CanFrame {
    single_byte_frame(CanId::system_management(secondary::ENTER_CONFIG, source_address), byte)
}

/// One byte of the `'O' 'P' 'R'` Exit-Config sequence.
pub fn exit_config_frame(source_address: u8, byte: u8) -> CanFrame {
    single_byte_frame(CanId::system_management(secondary::EXIT_CONFIG, source_address), byte)
}

fn single_byte_frame(id: CanId, byte: u8) -> CanFrame {
    let mut data = [0u8; 8];
    data[0] = byte;
    CanFrame { id, data, len: 1 }
}

//! Config-mode handshake: the three-byte `'C' 'F' 'G'` (enter) and
//! `'O' 'P' 'R'` (exit) sequences.
//!
//! [`SequenceTracker`] validates sequences seen on the bus, [`HandshakeSender`]
//! paces the bytes of a locally requested sequence.
use embassy_time::{Duration, Instant};
use tracing::debug;

use crate::protocol::transport::{CONFIG_ENTER_RESEND, CONFIG_INTER_BYTE_TIMEOUT};

//==================================================================================Enums and Structs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sequence {
    /// `'C' 'F' 'G'`: enter System Configuration.
    Enter,
    /// `'O' 'P' 'R'`: leave System Configuration.
    Exit,
}

impl Sequence {
    pub const fn bytes(self) -> &'static [u8; 3] {
        match self {
            Sequence::Enter => b"CFG",
            Sequence::Exit => b"OPR",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TrackResult {
    /// Byte ignored, no sequence in progress.
    Ignored,
    /// Byte accepted, more are expected.
    Progress,
    /// Wrong byte or stalled sequence; tracking restarted.
    Reset,
    /// Third byte received in time.
    Complete,
}

//==================================================================================SEQUENCE_TRACKER
/// Receive side of one sequence. Bytes must follow each other within 400 ms
/// and come from the same source.
#[derive(Debug)]
pub struct SequenceTracker {
    sequence: Sequence,
    position: usize,
    source_address: u8,
    last_byte: Instant,
}

impl SequenceTracker {
    pub const fn new(sequence: Sequence) -> Self {
        Self {
            sequence,
            position: 0,
            source_address: 0,
            last_byte: Instant::from_ticks(0),
        }
    }

    /// Drop any partial sequence.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Feed one handshake byte sent by `source_address`.
    pub fn process_byte(&mut self, now: Instant, source_address: u8, byte: u8) -> TrackResult {
        let expected = self.sequence.bytes();
        let mut restarted = false;

        if self.position > 0
            && (source_address != self.source_address
                || now > self.last_byte + CONFIG_INTER_BYTE_TIMEOUT)
        {
            debug!(sequence = ?self.sequence, position = self.position, "handshake sequence stalled");
            self.position = 0;
            restarted = true;
        }

        if byte == expected[self.position] {
            self.position += 1;
            self.source_address = source_address;
            self.last_byte = now;
            if self.position == expected.len() {
                self.position = 0;
                return TrackResult::Complete;
            }
            return TrackResult::Progress;
        }

        if self.position > 0 {
            debug!(sequence = ?self.sequence, byte, "unexpected handshake byte");
            self.position = 0;
            restarted = true;
            // A fresh first byte starts a new attempt right away.
            if byte == expected[0] {
                self.position = 1;
                self.source_address = source_address;
                self.last_byte = now;
            }
        }

        if restarted {
            TrackResult::Reset
        } else {
            TrackResult::Ignored
        }
    }
}

//==================================================================================HANDSHAKE_SENDER
/// Transmit side of a locally requested sequence, one byte per PTU.
///
/// The Enter sequence restarts from its first byte every second while the
/// request stays pending; the Exit sequence is sent once.
#[derive(Debug)]
pub struct HandshakeSender {
    sequence: Sequence,
    pending: bool,
    position: usize,
    next_byte_at: Instant,
    restart_at: Instant,
}

impl HandshakeSender {
    pub const fn new(sequence: Sequence) -> Self {
        Self {
            sequence,
            pending: false,
            position: 0,
            next_byte_at: Instant::from_ticks(0),
            restart_at: Instant::from_ticks(0),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Start (or restart) the sequence; the first byte is due immediately.
    pub fn request(&mut self, now: Instant) {
        self.pending = true;
        self.position = 0;
        self.next_byte_at = now;
        self.restart_at = now + CONFIG_ENTER_RESEND;
    }

    /// Clear the request.
    pub fn cancel(&mut self) {
        self.pending = false;
        self.position = 0;
    }

    /// `true` once every byte of a pending sequence went out.
    pub fn is_finished(&self) -> bool {
        self.pending && self.position == self.sequence.bytes().len()
    }

    /// Next byte to transmit, if one is due.
    pub fn poll(&mut self, now: Instant, ptu: Duration) -> Option<u8> {
        if !self.pending {
            return None;
        }
        if self.sequence == Sequence::Enter && now >= self.restart_at {
            debug!("restarting enter-config sequence");
            self.position = 0;
            self.restart_at = now + CONFIG_ENTER_RESEND;
        }

        let bytes = self.sequence.bytes();
        if self.position >= bytes.len() || now < self.next_byte_at {
            return None;
        }
        let byte = bytes[self.position];
        self.position += 1;
        self.next_byte_at = now + ptu;
        Some(byte)
    }
}

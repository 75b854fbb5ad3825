//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN ID construction,
//! session configuration, transport failures, queueing, etc.).
use thiserror::Error;

//==================================================================================CAN_ID_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while building a 29-bit MILCAN identifier.
pub enum CanIdBuildError {
    /// Priority does not fit in the 3-bit field.
    #[error("Invalid priority {priority}: expected 0..=7")]
    InvalidPriority { priority: u8 },
    /// Source address 0 is reserved and never identifies a node.
    #[error("Source address 0 is reserved")]
    ReservedSourceAddress,
}

//==================================================================================FRAME_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while building a classic CAN frame.
pub enum FrameError {
    /// Classic CAN carries at most eight payload bytes.
    #[error("Payload too long: {len} bytes, maximum is 8")]
    PayloadTooLong { len: usize },
}

//==================================================================================CONFIG_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Invalid session configuration.
pub enum ConfigError {
    /// Source address 0 is reserved.
    #[error("Source address 0 is reserved")]
    ReservedSourceAddress,
    /// A sync frequency of zero has no period.
    #[error("Invalid sync frequency: {hz} Hz")]
    InvalidSyncFrequency { hz: u16 },
    /// The sync period exceeds the handshake inter-byte timeout, so config-mode
    /// sequences paced one byte per period could never complete.
    #[error("Sync frequency {hz} Hz is below the {min} Hz minimum")]
    SyncFrequencyTooLow { hz: u16, min: u16 },
    /// The bus cannot carry one maximum-length frame per sync period.
    #[error("Sync frequency {hz} Hz exceeds the {max} Hz the bus can carry")]
    SyncFrequencyTooHigh { hz: u16, max: u16 },
}

//==================================================================================BUS_ERROR
#[derive(Error, Debug)]
/// Failures reported by a [`CanBus`](crate::protocol::transport::traits::can_bus::CanBus)
/// adapter.
pub enum BusError<E: core::fmt::Debug> {
    /// Malformed or partial read/write. The frame is dropped and the session keeps running.
    #[error("Recoverable transport error: {reason}")]
    Recoverable { reason: &'static str },
    /// The transport is unusable or closed. The session stops.
    #[error("Fatal transport error: {0:?}")]
    Fatal(E),
}

//==================================================================================SEND_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors returned when handing work to a running session.
pub enum SendError {
    /// The transmit queue could not grow, or the command queue is full.
    #[error("Resource exhausted")]
    ResourceExhausted,
    /// The session background task is no longer running.
    #[error("Session closed")]
    Closed,
}

//==================================================================================SESSION_ERROR
#[derive(Error, Debug)]
/// Errors crossing the session boundary.
pub enum SessionError<E: core::fmt::Debug> {
    /// `open` was called outside of a Tokio runtime.
    #[error("No Tokio runtime available to run the session")]
    NoRuntime,
    /// The transport failed fatally. Close the session and optionally reopen it.
    #[error("Transport failure: {0:?}")]
    Transport(E),
    /// The background task panicked or was cancelled.
    #[error("Session task aborted")]
    Aborted,
}

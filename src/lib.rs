//! `korri-milcan` library: MILCAN A (MWG-MILA-001) network management on top
//! of a CAN transport. The crate exposes the transport model (identifiers,
//! frames, the priority transmit queue, bus traits) and the protocol logic
//! (sync master election, operating modes, config-mode handshake, sessions).
//!
//! ```rust,ignore
//! use korri_milcan::prelude::*;
//!
//! let config = SessionConfig::builder(0x10).can_be_sync_master(true).build()?;
//! let session = Session::open(my_bus, config)?;
//! session.send(CanFrame::new(id, &[1, 2, 3])?)?;
//! while let Some(frame) = session.recv() { /* ... */ }
//! session.close().await?;
//! ```
//==================================================================================
/// Domain and low-level errors (identifier construction, configuration,
/// transport, queueing).
pub mod error;
/// MILCAN protocol implementation: CAN transport and network management.
pub mod protocol;
//==================================================================================
/// Most used types in one import.
pub mod prelude {
    pub use crate::error::{BusError, ConfigError, SendError, SessionError};
    pub use crate::protocol::managment::mode_manager::Mode;
    pub use crate::protocol::managment::session::{
        Session, SessionConfig, SessionOptions, SessionStatus,
    };
    pub use crate::protocol::transport::can_frame::{CanFrame, Frame, MilcanFrame};
    pub use crate::protocol::transport::can_id::CanId;
    pub use crate::protocol::transport::traits::can_bus::CanBus;
    pub use crate::protocol::transport::BusSpeed;
}

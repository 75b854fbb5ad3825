//! Network management logic: sync master election and timing, the
//! config-mode handshake, the operating-mode state machine, and the session
//! shell that runs them against a CAN transport.
pub mod config_handshake;
pub mod mode_manager;
pub mod session;
pub mod sync_timing;

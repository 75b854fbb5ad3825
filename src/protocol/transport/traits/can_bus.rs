//! Minimal abstraction for a CAN transport. Allows the library to plug into
//! various adapters (USB dongles, SocketCAN, embedded HAL, in-memory buses).
use crate::error::BusError;
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract to send frames and poll for received ones.
pub trait CanBus {
    type Error: core::fmt::Debug + Send + 'static;
    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking drivers.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), BusError<Self::Error>>> + Send + 'a;
    /// Take one received frame if any is waiting. Must not block.
    ///
    /// `Ok(None)` is the normal answer on a quiet bus.
    fn try_recv(&mut self) -> Result<Option<CanFrame>, BusError<Self::Error>>;
    /// Release the underlying device. Called once when the session stops.
    fn close(&mut self) {}
}

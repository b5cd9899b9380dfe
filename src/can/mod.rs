//! The CAN port abstraction and its in-process virtual implementation.

pub mod virtual_bus;

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::CanFrame;

/// A boxed callback invoked once per received frame, in registration order.
pub type FrameHandler = Box<dyn FnMut(&CanFrame) + Send>;

/// The minimal capability a J1939 Port needs from its transport: send a
/// frame, and register to be told about frames as they arrive.
///
/// Driver-agnostic: a real CAN adapter and [`virtual_bus::VirtualCanPort`]
/// both satisfy this contract identically from the Port's point of view.
#[async_trait]
pub trait CanPort: Send {
    /// Send a frame. Delivery to other endpoints, if any, is never
    /// synchronous with this call.
    async fn send(&self, frame: CanFrame) -> Result<()>;

    /// Register a handler invoked for every frame this port receives.
    /// Handlers run in registration order.
    fn on_frame(&mut self, handler: FrameHandler);

    /// Pump whatever delivery is ready without blocking: for
    /// [`virtual_bus::VirtualCanPort`] this drains its queued inbox; a real
    /// adapter would read whatever the OS socket already has buffered.
    /// Intended to be called once per scheduler tick, before handlers are
    /// expected to have seen anything sent earlier in the same tick.
    fn poll(&mut self);
}

pub use virtual_bus::{VirtualCanBus, VirtualCanPort};

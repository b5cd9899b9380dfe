//! In-process virtual CAN bus: a deterministic, multi-endpoint relay.
//!
//! Every port connected to the same bus receives every other port's
//! sends, queued for delivery on the next drain rather than
//! synchronously; per-sender order is preserved on each receiver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CanPort, FrameHandler};
use crate::error::Result;
use crate::frame::CanFrame;

struct Endpoint {
    id: u64,
    inbox: Arc<std::sync::Mutex<VecDeque<CanFrame>>>,
}

/// A named, in-process CAN bus. Multiple [`VirtualCanPort`]s `connect` to
/// the same bus by sharing an `Arc<VirtualCanBus>`.
pub struct VirtualCanBus {
    name: String,
    endpoints: RwLock<Vec<Endpoint>>,
    next_id: AtomicU64,
}

impl VirtualCanBus {
    /// Create a new, empty bus with the given name.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            endpoints: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// This bus's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of currently connected endpoints.
    pub async fn endpoint_count(&self) -> usize {
        self.endpoints.read().await.len()
    }

    async fn register(&self, inbox: Arc<std::sync::Mutex<VecDeque<CanFrame>>>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.endpoints.write().await.push(Endpoint { id, inbox });
        id
    }

    async fn unregister(&self, id: u64) {
        self.endpoints.write().await.retain(|e| e.id != id);
    }

    /// Deliver `frame` to every connected endpoint except `sender_id`, in
    /// the bus's insertion (connect) order. Queued, not delivered
    /// synchronously: the receiving port only sees it once it next drains.
    async fn deliver(&self, sender_id: u64, frame: CanFrame) {
        let endpoints = self.endpoints.read().await;
        for endpoint in endpoints.iter() {
            if endpoint.id != sender_id {
                endpoint.inbox.lock().unwrap().push_back(frame.clone());
            }
        }
    }
}

/// A port connected to a [`VirtualCanBus`].
///
/// Not required to be thread-safe beyond what `Send` demands of the
/// scheduler's async tasks: concurrency here is cooperative, driven
/// entirely by the scheduler calling [`VirtualCanPort::drain`].
pub struct VirtualCanPort {
    bus: Arc<VirtualCanBus>,
    id: u64,
    inbox: Arc<std::sync::Mutex<VecDeque<CanFrame>>>,
    handlers: Vec<FrameHandler>,
}

impl VirtualCanPort {
    /// Connect a new port to `bus`.
    pub async fn connect(bus: Arc<VirtualCanBus>) -> Self {
        let inbox = Arc::new(std::sync::Mutex::new(VecDeque::new()));
        let id = bus.register(inbox.clone()).await;
        Self {
            bus,
            id,
            inbox,
            handlers: Vec::new(),
        }
    }

    /// Disconnect from the bus. The port's inbox is preserved so any
    /// frames already queued can still be drained afterward.
    pub async fn disconnect(&self) {
        self.bus.unregister(self.id).await;
    }

    /// Test hook: deliver `frame` to this port as if it had arrived over
    /// the bus, bypassing the bus entirely.
    pub fn inject_frame(&self, frame: CanFrame) {
        self.inbox.lock().unwrap().push_back(frame);
    }

    /// Drain every frame queued since the last drain and dispatch it to
    /// registered handlers, in per-sender send order. Intended to be
    /// called once per scheduler tick.
    pub fn drain(&mut self) {
        let frames: Vec<CanFrame> = {
            let mut inbox = self.inbox.lock().unwrap();
            inbox.drain(..).collect()
        };
        for frame in &frames {
            for handler in self.handlers.iter_mut() {
                handler(frame);
            }
        }
    }

    /// Number of frames currently queued but not yet drained.
    pub fn pending_count(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }
}

#[async_trait]
impl CanPort for VirtualCanPort {
    async fn send(&self, frame: CanFrame) -> Result<()> {
        self.bus.deliver(self.id, frame).await;
        Ok(())
    }

    fn on_frame(&mut self, handler: FrameHandler) {
        self.handlers.push(handler);
    }

    fn poll(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn frame(id: u32) -> CanFrame {
        CanFrame::new(id, vec![0u8; 8], 0)
    }

    #[tokio::test]
    async fn test_send_not_delivered_to_sender() {
        let bus = VirtualCanBus::new("bus0");
        let mut a = VirtualCanPort::connect(bus.clone()).await;
        a.send(frame(1)).await.unwrap();
        a.drain();
        assert_eq!(a.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_delivered_to_other_port_only_after_drain() {
        let bus = VirtualCanBus::new("bus0");
        let a = VirtualCanPort::connect(bus.clone()).await;
        let mut b = VirtualCanPort::connect(bus.clone()).await;

        a.send(frame(42)).await.unwrap();
        // Deferred: not visible to b's handlers until b drains.
        assert_eq!(b.pending_count(), 1);

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        b.on_frame(Box::new(move |f: &CanFrame| {
            received_clone.lock().unwrap().push(f.id);
        }));
        b.drain();
        assert_eq!(*received.lock().unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_per_sender_order_preserved() {
        let bus = VirtualCanBus::new("bus0");
        let a = VirtualCanPort::connect(bus.clone()).await;
        let mut b = VirtualCanPort::connect(bus.clone()).await;

        a.send(frame(1)).await.unwrap();
        a.send(frame(2)).await.unwrap();
        a.send(frame(3)).await.unwrap();

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        b.on_frame(Box::new(move |f: &CanFrame| {
            received_clone.lock().unwrap().push(f.id);
        }));
        b.drain();
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_disconnect_stops_delivery() {
        let bus = VirtualCanBus::new("bus0");
        let a = VirtualCanPort::connect(bus.clone()).await;
        let b = VirtualCanPort::connect(bus.clone()).await;
        b.disconnect().await;
        a.send(frame(1)).await.unwrap();
        assert_eq!(b.pending_count(), 0);
        assert_eq!(bus.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_inject_frame_bypasses_bus() {
        let bus = VirtualCanBus::new("bus0");
        let mut a = VirtualCanPort::connect(bus.clone()).await;
        a.inject_frame(frame(7));
        let seen = Arc::new(StdMutex::new(None));
        let seen_clone = seen.clone();
        a.on_frame(Box::new(move |f: &CanFrame| {
            *seen_clone.lock().unwrap() = Some(f.id);
        }));
        a.drain();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }
}

//! Plugin contract: the restricted capability surface given to third-party
//! simulation components.
//!
//! A plugin may send, request, subscribe, and read simulated time, and
//! nothing else: `PluginContext` exposes no way to reach the host beyond
//! those operations.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::can::CanPort;
use crate::codec::pgn;
use crate::error::{J1939Error, Result};
use crate::message::J1939Message;
use crate::port::{J1939Port, PortSender};

use super::ecu::{LifecycleState, SimComponent};

/// Protocol-internal PGNs a plugin may never subscribe to: reaching them
/// would mean peeking at host-only Transport Protocol and address-claim
/// bookkeeping instead of application traffic.
const RESERVED_PGNS: &[u32] = &[pgn::TP_CM, pgn::TP_DT, pgn::REQUEST, pgn::ADDRESS_CLAIMED];

/// The capability surface handed to a plugin at `init`/`on_tick`/`on_pgn`.
/// Intentionally smaller than [`PortSender`] plus full port access: a
/// plugin cannot bind a raw [`crate::can::CanPort`], claim an address, or
/// read another component's internal state.
pub struct PluginContext {
    sender: PortSender,
    now_ms: u64,
    subscriptions: Arc<Mutex<HashSet<u32>>>,
}

impl PluginContext {
    pub(crate) fn new(sender: PortSender, now_ms: u64, subscriptions: Arc<Mutex<HashSet<u32>>>) -> Self {
        Self {
            sender,
            now_ms,
            subscriptions,
        }
    }

    /// Send `data` as `pgn` to `da`.
    pub fn send_pgn(&self, pgn: u32, data: impl Into<Vec<u8>>, da: u8) {
        self.sender.send_pgn(pgn, data, da);
    }

    /// REQUEST `pgn` from `da`.
    pub fn request_pgn(&self, pgn: u32, da: u8) {
        self.sender.request_pgn(pgn, da);
    }

    /// Subscribe to `pgn`: matching messages are delivered to `on_pgn` from
    /// then on. Protocol-internal PGNs (Transport Protocol control frames,
    /// REQUEST, Address Claimed) are silently refused; a plugin has no
    /// business reading bus-management traffic, only application PGNs.
    pub fn subscribe_pgn(&self, pgn: u32) {
        if RESERVED_PGNS.contains(&pgn) {
            return;
        }
        self.subscriptions.lock().unwrap().insert(pgn);
    }

    /// Current simulated time, in milliseconds since the scheduler started.
    pub fn get_time(&self) -> u64 {
        self.now_ms
    }

    pub(crate) fn set_time(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }
}

/// A third-party simulation component. Unlike [`crate::sim::Ecu`], a
/// plugin does not own a dedicated [`crate::port::J1939Port`]/source
/// address; it is driven through a shared [`PluginContext`] the host
/// validates before registration.
pub trait Plugin: Send {
    /// Name used in logs and the `error` event.
    fn name(&self) -> &str;
    /// Called once before the first tick.
    fn init(&mut self, ctx: &PluginContext) {
        let _ = ctx;
    }
    /// Called once when the plugin is unregistered or the simulation stops.
    fn shutdown(&mut self) {}
    /// Called every scheduler tick.
    fn on_tick(&mut self, ctx: &PluginContext);
    /// Called for every message the plugin has subscribed to.
    fn on_pgn(&mut self, _message: &J1939Message, _ctx: &PluginContext) {}
}

/// Drives one [`Plugin`] against its own [`J1939Port`], the same way
/// [`super::ecu::EcuRunner`] drives an [`crate::sim::Ecu`]: a single
/// wildcard handler feeds a plain queue the runner drains each tick, so no
/// plugin closure ever re-enters the port.
///
/// Unlike `EcuRunner`, delivery is filtered through the subscription set
/// the plugin builds up via [`PluginContext::subscribe_pgn`]; a plugin that
/// never subscribes to anything never receives `on_pgn` calls.
pub struct PluginRunner<C: CanPort> {
    port: J1939Port<C>,
    plugin: Box<dyn Plugin>,
    state: LifecycleState,
    subscriptions: Arc<Mutex<HashSet<u32>>>,
    incoming: Arc<Mutex<VecDeque<J1939Message>>>,
    now_ms: u64,
}

impl<C: CanPort> PluginRunner<C> {
    /// Validate `plugin`'s capability surface and bind it to a fresh port
    /// claiming `source_address`. Refuses a plugin with no name: the host
    /// has nothing to log or diagnose it by, and a nameless component
    /// cannot be identified in an `error` event.
    pub fn new(can: C, plugin: Box<dyn Plugin>, source_address: u8) -> Result<Self> {
        if plugin.name().is_empty() {
            return Err(J1939Error::plugin_capability(
                "plugin must report a non-empty name",
            ));
        }

        let mut port = J1939Port::new(can, source_address);

        let subscriptions = Arc::new(Mutex::new(HashSet::new()));
        let incoming = Arc::new(Mutex::new(VecDeque::new()));
        let subs_clone = subscriptions.clone();
        let incoming_clone = incoming.clone();
        port.on_pgn(
            None,
            Box::new(move |msg: &J1939Message, _sender: &PortSender| {
                if subs_clone.lock().unwrap().contains(&msg.pgn) {
                    incoming_clone.lock().unwrap().push_back(msg.clone());
                }
                Ok(())
            }),
        );

        Ok(Self {
            port,
            plugin,
            state: LifecycleState::Stopped,
            subscriptions,
            incoming,
            now_ms: 0,
        })
    }

    /// The underlying port, for tests or diagnostics wiring.
    pub fn port(&self) -> &J1939Port<C> {
        &self.port
    }

    fn context(&self) -> PluginContext {
        PluginContext::new(self.port.port_sender(), self.now_ms, self.subscriptions.clone())
    }
}

#[async_trait]
impl<C: CanPort> SimComponent for PluginRunner<C> {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn state(&self) -> LifecycleState {
        self.state
    }

    async fn start(&mut self) -> Result<()> {
        self.state = LifecycleState::Running;
        let ctx = self.context();
        self.plugin.init(&ctx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.plugin.shutdown();
        self.state = LifecycleState::Stopped;
        Ok(())
    }

    fn pause(&mut self) {
        if self.state == LifecycleState::Running {
            self.state = LifecycleState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == LifecycleState::Paused {
            self.state = LifecycleState::Running;
        }
    }

    async fn tick(&mut self, now_ms: u64, _delta_ms: u64) -> Result<()> {
        if self.state != LifecycleState::Running {
            return Ok(());
        }
        self.now_ms = now_ms;
        self.port.tick(now_ms).await;

        let messages: Vec<J1939Message> = { self.incoming.lock().unwrap().drain(..).collect() };
        let ctx = self.context();
        for msg in messages {
            self.plugin.on_pgn(&msg, &ctx);
        }
        self.plugin.on_tick(&ctx);
        Ok(())
    }

    fn cleanup_tp(&mut self, now_ms: u64) {
        self.port.cleanup_tp(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::virtual_bus::{VirtualCanBus, VirtualCanPort};

    fn test_context() -> PluginContext {
        PluginContext::new(crate::port::test_sender(), 0, Arc::new(Mutex::new(HashSet::new())))
    }

    struct NoOpPlugin;
    impl Plugin for NoOpPlugin {
        fn name(&self) -> &str {
            "noop"
        }
        fn on_tick(&mut self, _ctx: &PluginContext) {}
    }

    #[test]
    fn test_plugin_default_hooks_are_harmless() {
        let ctx = test_context();
        let mut plugin = NoOpPlugin;
        plugin.init(&ctx);
        plugin.on_tick(&ctx);
        plugin.shutdown();
    }

    #[test]
    fn test_context_reports_simulated_time() {
        let mut ctx = test_context();
        assert_eq!(ctx.get_time(), 0);
        ctx.set_time(500);
        assert_eq!(ctx.get_time(), 500);
    }

    #[test]
    fn test_subscribe_rejects_reserved_pgns() {
        let ctx = test_context();
        ctx.subscribe_pgn(pgn::TP_CM);
        ctx.subscribe_pgn(pgn::EEC1);
        assert!(!ctx.subscriptions.lock().unwrap().contains(&pgn::TP_CM));
        assert!(ctx.subscriptions.lock().unwrap().contains(&pgn::EEC1));
    }

    #[tokio::test]
    async fn test_nameless_plugin_rejected_at_registration() {
        struct Nameless;
        impl Plugin for Nameless {
            fn name(&self) -> &str {
                ""
            }
            fn on_tick(&mut self, _ctx: &PluginContext) {}
        }
        let bus = VirtualCanBus::new("plugin-reject");
        let port = VirtualCanPort::connect(bus).await;
        let result = PluginRunner::new(port, Box::new(Nameless), 0x20);
        assert!(matches!(result, Err(J1939Error::PluginCapability(_))));
    }

    #[tokio::test]
    async fn test_plugin_runner_delivers_subscribed_pgn_on_tick() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingPlugin {
            seen: Arc<AtomicU32>,
        }
        impl Plugin for CountingPlugin {
            fn name(&self) -> &str {
                "counter"
            }
            fn init(&mut self, ctx: &PluginContext) {
                ctx.subscribe_pgn(pgn::EEC1);
            }
            fn on_tick(&mut self, _ctx: &PluginContext) {}
            fn on_pgn(&mut self, message: &J1939Message, _ctx: &PluginContext) {
                if message.pgn == pgn::EEC1 {
                    self.seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let bus = VirtualCanBus::new("plugin-delivery");
        let sender_port = VirtualCanPort::connect(bus.clone()).await;
        let plugin_port = VirtualCanPort::connect(bus).await;

        let seen = Arc::new(AtomicU32::new(0));
        let mut runner =
            PluginRunner::new(plugin_port, Box::new(CountingPlugin { seen: seen.clone() }), 0x30)
                .unwrap();
        runner.start().await.unwrap();

        let mut sender = J1939Port::new(sender_port, 0x00);
        sender.send_pgn(pgn::EEC1, &[0u8; 8], 0xFF).await.unwrap();
        sender.tick(0).await;
        runner.tick(10, 10).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

//! The ECU trait and the runner that binds one to a [`J1939Port`].
//!
//! An ECU binds to a port once at construction, then lives through a
//! `start`/`tick`/`stop` lifecycle driven entirely by the scheduler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::can::CanPort;
use crate::error::Result;
use crate::message::J1939Message;
use crate::port::{J1939Port, PortSender};

/// Lifecycle state of a simulated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not yet started, or stopped.
    Stopped,
    /// Actively ticking.
    Running,
    /// Temporarily suspended: `tick` is skipped, state is retained.
    Paused,
}

/// An ECU: a simulated node on the bus with a fixed source address and a
/// periodic broadcast obligation.
///
/// Implementations never touch the [`CanPort`] or [`J1939Port`] directly;
/// they are handed a [`PortSender`] once, at bind time, which is "the sole
/// capability for bus communication" the ECU needs.
pub trait Ecu: Send {
    /// Human-readable name, used in logs and vehicle profile matching.
    fn name(&self) -> &str;
    /// Implementation version string.
    fn version(&self) -> &str {
        "0.1.0"
    }
    /// This ECU's claimed source address.
    fn source_address(&self) -> u8;
    /// How often this ECU broadcasts its periodic PGN(s), in milliseconds.
    fn broadcast_rate_ms(&self) -> u64;
    /// Receive the sole capability for bus communication.
    fn bind_j1939_port(&mut self, sender: PortSender);
    /// Called once when the component transitions to `Running`.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }
    /// Called once when the component transitions to `Stopped`.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
    /// Called every scheduler tick while `Running`.
    fn on_tick(&mut self, now_ms: u64, delta_ms: u64);
    /// Called for every message the ECU's port has decoded, after Transport
    /// Protocol reassembly.
    fn on_pgn(&mut self, _message: &J1939Message) {}
    /// Called when a peer REQUESTs a PGN from this ECU.
    fn on_request(&mut self, _requested_pgn: u32, _requester_sa: u8) {}
}

/// Drives one [`Ecu`] against its own [`J1939Port`]: pumps the port each
/// tick, drains reassembled messages and REQUEST events into plain queues,
/// then calls the ECU's callbacks directly. No closures call back into the
/// port, so there is no re-entrancy to worry about.
pub struct EcuRunner<C: CanPort, E: Ecu> {
    port: J1939Port<C>,
    ecu: E,
    state: LifecycleState,
    incoming: Arc<Mutex<VecDeque<J1939Message>>>,
    requests: Arc<Mutex<VecDeque<(u32, u8)>>>,
}

impl<C: CanPort, E: Ecu> EcuRunner<C, E> {
    /// Bind `ecu` to a fresh [`J1939Port`] over `can`, claiming the ECU's
    /// source address.
    pub fn new(can: C, mut ecu: E) -> Self {
        let sa = ecu.source_address();
        let mut port = J1939Port::new(can, sa);

        let incoming = Arc::new(Mutex::new(VecDeque::new()));
        let incoming_clone = incoming.clone();
        port.on_pgn(
            None,
            Box::new(move |msg: &J1939Message, _sender: &PortSender| {
                incoming_clone.lock().unwrap().push_back(msg.clone());
                Ok(())
            }),
        );

        let requests = Arc::new(Mutex::new(VecDeque::new()));
        let requests_clone = requests.clone();
        port.on_request(Box::new(move |pgn: u32, sa: u8, _sender: &PortSender| {
            requests_clone.lock().unwrap().push_back((pgn, sa));
            Ok(())
        }));

        ecu.bind_j1939_port(port.port_sender());

        Self {
            port,
            ecu,
            state: LifecycleState::Stopped,
            incoming,
            requests,
        }
    }

    /// The underlying port, for tests or diagnostics wiring.
    pub fn port(&self) -> &J1939Port<C> {
        &self.port
    }

    /// The underlying port, mutably.
    pub fn port_mut(&mut self) -> &mut J1939Port<C> {
        &mut self.port
    }

    /// Run the scheduler's periodic Transport Protocol cleanup.
    pub fn cleanup_tp(&mut self, now_ms: u64) {
        self.port.cleanup_tp(now_ms);
    }
}

#[async_trait]
impl<C: CanPort, E: Ecu> SimComponent for EcuRunner<C, E> {
    fn name(&self) -> &str {
        self.ecu.name()
    }

    fn state(&self) -> LifecycleState {
        self.state
    }

    async fn start(&mut self) -> Result<()> {
        self.ecu.start()?;
        self.state = LifecycleState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.ecu.stop()?;
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

    async fn tick(&mut self, now_ms: u64, delta_ms: u64) -> Result<()> {
        if self.state != LifecycleState::Running {
            return Ok(());
        }
        self.port.tick(now_ms).await;

        let messages: Vec<J1939Message> = { self.incoming.lock().unwrap().drain(..).collect() };
        for msg in messages {
            self.ecu.on_pgn(&msg);
        }

        let reqs: Vec<(u32, u8)> = { self.requests.lock().unwrap().drain(..).collect() };
        for (pgn, sa) in reqs {
            self.ecu.on_request(pgn, sa);
        }

        self.ecu.on_tick(now_ms, delta_ms);
        Ok(())
    }

    fn cleanup_tp(&mut self, now_ms: u64) {
        self.port.cleanup_tp(now_ms);
    }
}

/// A schedulable unit: an [`EcuRunner`] or a plugin wrapper, ticked in
/// registration order by the [`crate::sim::Scheduler`].
#[async_trait]
pub trait SimComponent: Send {
    /// Name used in logs and the `error` event.
    fn name(&self) -> &str;
    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;
    /// Transition to `Running`.
    async fn start(&mut self) -> Result<()>;
    /// Transition to `Stopped`.
    async fn stop(&mut self) -> Result<()>;
    /// Suspend without losing state.
    fn pause(&mut self);
    /// Resume from `Paused`.
    fn resume(&mut self);
    /// Advance by one scheduler tick. Skipped entirely unless `Running`.
    async fn tick(&mut self, now_ms: u64, delta_ms: u64) -> Result<()>;
    /// Run this component's Transport Protocol session cleanup, if it has
    /// one. Called by the scheduler at most once per simulated second.
    /// Default no-op for components with no open TP sessions to evict.
    fn cleanup_tp(&mut self, _now_ms: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::virtual_bus::{VirtualCanBus, VirtualCanPort};

    struct Counter {
        sa: u8,
        sender: Option<PortSender>,
        ticks: u32,
    }

    impl Ecu for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn source_address(&self) -> u8 {
            self.sa
        }
        fn broadcast_rate_ms(&self) -> u64 {
            100
        }
        fn bind_j1939_port(&mut self, sender: PortSender) {
            self.sender = Some(sender);
        }
        fn on_tick(&mut self, _now_ms: u64, _delta_ms: u64) {
            self.ticks += 1;
        }
    }

    #[tokio::test]
    async fn test_runner_skips_tick_unless_running() {
        let bus = VirtualCanBus::new("b");
        let port = VirtualCanPort::connect(bus).await;
        let mut runner = EcuRunner::new(
            port,
            Counter {
                sa: 0x10,
                sender: None,
                ticks: 0,
            },
        );
        runner.tick(0, 10).await.unwrap();
        assert_eq!(runner.ecu.ticks, 0, "stopped component must not tick");

        runner.start().await.unwrap();
        runner.tick(10, 10).await.unwrap();
        assert_eq!(runner.ecu.ticks, 1);

        runner.pause();
        runner.tick(20, 10).await.unwrap();
        assert_eq!(runner.ecu.ticks, 1, "paused component must not tick");

        runner.resume();
        runner.tick(30, 10).await.unwrap();
        assert_eq!(runner.ecu.ticks, 2);
    }
}

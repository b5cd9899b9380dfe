//! Deterministic Simulation Scheduler: fixed-tick, monotonic simulated
//! time, serial per-tick execution in registration order.
//!
//! No in-core code reads the wall clock; simulated time advances by
//! exactly `tick_ms` per tick regardless of real time elapsed.

use super::ecu::{LifecycleState, SimComponent};
use crate::error::J1939Error;

/// How often the scheduler runs [`crate::transport::TransportEngine`]
/// cleanup via each component, in simulated milliseconds. At most once
/// per simulated second.
const TP_CLEANUP_INTERVAL_MS: u64 = 1000;

/// The deterministic scheduler: owns every [`SimComponent`] and advances
/// simulated time in fixed steps, ticking components serially in the order
/// they were registered.
pub struct Scheduler {
    tick_ms: u64,
    now_ms: u64,
    components: Vec<Box<dyn SimComponent>>,
    last_cleanup_ms: u64,
    errors: Vec<(String, J1939Error)>,
}

impl Scheduler {
    /// Construct a scheduler with the given fixed tick size.
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick_ms,
            now_ms: 0,
            components: Vec::new(),
            last_cleanup_ms: 0,
            errors: Vec::new(),
        }
    }

    /// Register a component. Components tick in registration order.
    pub fn register(&mut self, component: Box<dyn SimComponent>) {
        self.components.push(component);
    }

    /// Current simulated time.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Every `(component name, error)` pair surfaced by a failed `tick`,
    /// in the order they occurred. Does not clear on read.
    pub fn errors(&self) -> &[(String, J1939Error)] {
        &self.errors
    }

    /// Start every registered component.
    pub async fn start_all(&mut self) -> crate::error::Result<()> {
        for component in self.components.iter_mut() {
            component.start().await?;
        }
        Ok(())
    }

    /// Stop every registered component.
    pub async fn stop_all(&mut self) -> crate::error::Result<()> {
        for component in self.components.iter_mut() {
            component.stop().await?;
        }
        Ok(())
    }

    /// Advance simulated time by exactly one `tick_ms` step. Components run
    /// serially, in registration order; a component whose `tick` fails is
    /// recorded in [`errors`](Self::errors) and does not affect the others.
    /// Only components in [`LifecycleState::Running`] are ticked: this is
    /// the scheduler's own gate, not something it trusts each component to
    /// enforce on itself.
    pub async fn tick(&mut self) {
        let delta = self.tick_ms;
        self.now_ms += delta;
        for component in self.components.iter_mut() {
            if component.state() != LifecycleState::Running {
                continue;
            }
            if let Err(e) = component.tick(self.now_ms, delta).await {
                #[cfg(feature = "tracing-support")]
                tracing::warn!(component = component.name(), error = %e, "component tick failed");
                self.errors.push((component.name().to_string(), e));
            }
        }
        if self.now_ms.saturating_sub(self.last_cleanup_ms) >= TP_CLEANUP_INTERVAL_MS {
            self.last_cleanup_ms = self.now_ms;
            for component in self.components.iter_mut() {
                component.cleanup_tp(self.now_ms);
            }
        }
    }

    /// Run [`tick`](Self::tick) until `now_ms` reaches `duration_ms`.
    pub async fn run_for(&mut self, duration_ms: u64) {
        while self.now_ms < duration_ms {
            self.tick().await;
        }
    }
}

//! Deterministic Simulation Scheduler and ECU Framework.

pub mod ecu;
pub mod plugin;
pub mod scheduler;

pub use ecu::{Ecu, EcuRunner, LifecycleState};
pub use plugin::{Plugin, PluginContext, PluginRunner};
pub use scheduler::Scheduler;

//! # j1939-sim
//!
//! A J1939 protocol engine and deterministic multi-ECU simulator over an
//! in-process virtual CAN fabric.
//!
//! ## Features
//!
//! - **Driver agnostic**: the [`can::CanPort`] trait is satisfied by the
//!   bundled [`can::VirtualCanPort`] or by a real adapter; nothing above it
//!   knows the difference.
//! - **Deterministic**: the [`sim::Scheduler`] advances a monotonic
//!   simulated clock in fixed steps; no in-core code reads the wall clock.
//! - **Feature gated**: the CLI front-end and `tracing` instrumentation
//!   are both optional.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use j1939_sim::prelude::*;
//!
//! let bus = VirtualCanBus::new("vcan0");
//! let mut scheduler = Scheduler::new(10);
//! let port = VirtualCanPort::connect(bus.clone()).await;
//! scheduler.register(Box::new(EcuRunner::new(port, EngineEcu::new())));
//! scheduler.start_all().await?;
//! scheduler.run_for(5_000).await;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod can;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod ecus;
pub mod error;
pub mod frame;
pub mod message;
pub mod port;
pub mod sim;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::can::{CanPort, VirtualCanBus, VirtualCanPort};
    pub use crate::codec::{self, pgn, spn};
    pub use crate::config::VehicleProfile;
    pub use crate::diagnostics::DiagnosticsManager;
    pub use crate::ecus::{DiagnosticToolEcu, EngineEcu, TransmissionEcu};
    pub use crate::error::{J1939Error, Result};
    pub use crate::frame::CanFrame;
    pub use crate::message::J1939Message;
    pub use crate::port::{AddressClaimEvent, J1939Port, PortSender};
    pub use crate::sim::{Ecu, EcuRunner, Plugin, PluginContext, PluginRunner, Scheduler};
}

// Re-export the most commonly used types at the crate root.
pub use crate::error::{J1939Error, Result};
pub use crate::frame::CanFrame;
pub use crate::message::J1939Message;

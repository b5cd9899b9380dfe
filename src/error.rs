//! Error types for the J1939 protocol engine and simulator.

use thiserror::Error;

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, J1939Error>;

/// The main error type for all engine operations.
#[derive(Debug, Error)]
pub enum J1939Error {
    // === Frame / wire errors ===
    /// Frame is not extended, payload exceeds 8 bytes, or the identifier is out of range.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// `send_pgn` was called with a payload larger than the 1785-byte TP ceiling.
    #[error("payload too large: {len} bytes exceeds the 1785-byte transport ceiling")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    // === Transport Protocol errors ===
    /// Internal bookkeeping only: a TP session expired from inactivity.
    ///
    /// Never returned from a public API; sessions are evicted silently per
    /// the transport engine's own contract. Kept as a variant so internal
    /// logging can classify the drop without a separate type.
    #[error("TP session timed out: sa={sa:#04x} da={da:#04x} pgn={pgn:#06x}")]
    TPTimeout {
        /// Source address of the session.
        sa: u8,
        /// Destination address of the session.
        da: u8,
        /// PGN being transferred.
        pgn: u32,
    },

    /// Unexpected control byte or reference to an unknown session.
    #[error("TP protocol violation: {0}")]
    TPProtocolViolation(String),

    // === Subscriber errors ===
    /// A subscriber handler raised while processing a delivered message.
    #[error("handler fault on pgn {pgn:#06x}: {detail}")]
    HandlerFault {
        /// PGN being dispatched when the handler failed.
        pgn: u32,
        /// Failure detail captured from the handler.
        detail: String,
    },

    // === Configuration errors ===
    /// Unknown ECU name or an invalid vehicle-profile field.
    #[error("configuration error: {0}")]
    Configuration(String),

    // === Plugin errors ===
    /// A plugin attempted to use a capability it was not granted.
    #[error("plugin capability violation: {0}")]
    PluginCapability(String),

    // === Internal / programmer errors ===
    /// Failure to bind to the scheduler, construct the virtual bus, or an
    /// invalid frozen-constant violation. Fatal.
    #[error("internal error: {0}")]
    Internal(String),
}

impl J1939Error {
    /// True for the three error kinds that are dropped-and-logged rather
    /// than surfaced as an actionable failure to the caller.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrame(_) | Self::TPProtocolViolation(_) | Self::HandlerFault { .. }
        )
    }

    /// True for errors that indicate a programmer error or unrecoverable
    /// host failure rather than a malformed wire message.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Construct an [`J1939Error::InvalidFrame`].
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Construct a [`J1939Error::TPProtocolViolation`].
    pub fn tp_violation(msg: impl Into<String>) -> Self {
        Self::TPProtocolViolation(msg.into())
    }

    /// Construct a [`J1939Error::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Construct a [`J1939Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Construct a [`J1939Error::PluginCapability`].
    pub fn plugin_capability(msg: impl Into<String>) -> Self {
        Self::PluginCapability(msg.into())
    }
}

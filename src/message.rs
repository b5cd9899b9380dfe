//! The reassembled, addressed J1939 message handed to subscribers.

use bytes::Bytes;

/// A fully decoded J1939 message: either a single frame's payload, or the
/// result of Transport Protocol reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1939Message {
    /// Parameter Group Number.
    pub pgn: u32,
    /// Message priority as sent.
    pub priority: u8,
    /// Source address of the sender.
    pub sa: u8,
    /// Destination address, or `0xFF` for a broadcast.
    pub da: u8,
    /// Payload, 0 to 1785 bytes.
    pub data: Bytes,
    /// Simulation time at which this message was fully received, in milliseconds.
    pub timestamp_ms: u64,
}

//! The wire-level CAN frame carried by every port and the virtual bus.

use bytes::Bytes;

/// A single CAN frame as it travels on the bus.
///
/// Frames are immutable once sent; the bus delivers a clone of the same
/// frame to every connected port except the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// 29-bit extended CAN identifier (only the low 29 bits are meaningful).
    pub id: u32,
    /// Frame payload, 0 to 8 bytes.
    pub data: Bytes,
    /// Whether this is a 29-bit extended-format frame. J1939 only uses
    /// extended frames; non-extended frames are rejected by the port.
    pub extended: bool,
    /// Simulation time at which the frame was sent, in milliseconds.
    pub timestamp_ms: u64,
}

impl CanFrame {
    /// Highest value a 29-bit identifier may hold.
    pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

    /// Construct a new extended-format frame.
    ///
    /// `data` longer than 8 bytes is a programmer error at this layer; the
    /// port is responsible for routing anything larger through the
    /// Transport Protocol engine before a frame is ever built.
    pub fn new(id: u32, data: impl Into<Bytes>, timestamp_ms: u64) -> Self {
        Self {
            id,
            data: data.into(),
            extended: true,
            timestamp_ms,
        }
    }

    /// Pad `data` to 8 bytes with `0xFF`, J1939's "not available" filler.
    pub fn pad_to_8(data: &[u8]) -> Bytes {
        let mut buf = [0xFFu8; 8];
        let n = data.len().min(8);
        buf[..n].copy_from_slice(&data[..n]);
        Bytes::copy_from_slice(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_8() {
        let padded = CanFrame::pad_to_8(&[1, 2, 3]);
        assert_eq!(&padded[..], &[1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_pad_to_8_truncates() {
        let padded = CanFrame::pad_to_8(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(padded.len(), 8);
        assert_eq!(&padded[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}

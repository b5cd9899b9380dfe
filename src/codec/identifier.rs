//! J1939 Identifier Codec: pure functions over the 29-bit extended CAN ID.
//!
//! Bit layout (bit 28 is the MSB of the 29-bit field):
//!
//! ```text
//! bits 26-28: priority (0..=7)
//! bit  25:    extended data page (EDP)
//! bit  24:    data page (DP)
//! bits 16-23: PDU Format (PF)
//! bits  8-15: PDU Specific (PS)
//! bits  0-7:  Source Address (SA)
//! ```

/// Parsed fields of a 29-bit J1939 identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J1939Id {
    /// Message priority, 0 (highest) to 7 (lowest).
    pub priority: u8,
    /// Parameter Group Number recovered from PF/PS/DP.
    pub pgn: u32,
    /// Source address of the sender.
    pub sa: u8,
    /// Destination address: the PS field for PDU1, or `0xFF` for PDU2.
    pub da: u8,
    /// `true` if this identifier uses PDU1 (destination-specific) framing.
    pub pdu1: bool,
}

/// Inputs to [`build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J1939IdFields {
    /// Message priority; clamped to 0..=7.
    pub priority: u8,
    /// Target PGN.
    pub pgn: u32,
    /// Source address.
    pub sa: u8,
    /// Destination address. Ignored when `pgn` is a PDU2 (broadcast) PGN.
    pub da: u8,
}

/// Parse a 29-bit extended CAN identifier into its J1939 fields.
///
/// Callers are expected to have already validated `id <= 0x1FFF_FFFF`;
/// bits above the 29-bit field are masked off rather than rejected.
pub fn parse(id: u32) -> J1939Id {
    let id = id & 0x1FFF_FFFF;
    let priority = ((id >> 26) & 0x07) as u8;
    let dp = (id >> 24) & 0x01;
    let pf = (id >> 16) & 0xFF;
    let ps = (id >> 8) & 0xFF;
    let sa = (id & 0xFF) as u8;

    if pf < 240 {
        J1939Id {
            priority,
            pgn: (dp << 16) | (pf << 8),
            sa,
            da: ps as u8,
            pdu1: true,
        }
    } else {
        J1939Id {
            priority,
            pgn: (dp << 16) | (pf << 8) | ps,
            sa,
            da: 0xFF,
            pdu1: false,
        }
    }
}

/// Build a 29-bit extended CAN identifier from J1939 fields.
///
/// `priority` is clamped to 0..=7. `pgn` must fit within `0x00_0000..=0x03_FFFF`
/// (i.e. the DP/PF/PS fields); out-of-range bits are masked off rather than
/// rejected, matching the identifier codec's "pure, total" contract. For a
/// PDU2 (broadcast) PGN, `fields.da` is ignored and the PS byte comes from
/// the PGN's own low byte instead.
pub fn build(fields: J1939IdFields) -> u32 {
    let priority = (fields.priority.min(7)) as u32;
    let pgn = fields.pgn & 0x03_FFFF;
    let dp = (pgn >> 16) & 0x01;
    let pf = (pgn >> 8) & 0xFF;

    let ps = if pf >= 240 {
        pgn & 0xFF
    } else {
        fields.da as u32
    };

    (priority << 26) | (dp << 24) | (pf << 16) | (ps << 8) | (fields.sa as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pdu1_scenario_a() {
        // parse(0x18EA00F9) -> {priority: 6, pgn: 0xEA00, sa: 0xF9, da: 0x00, pdu1: true}
        let id = parse(0x18EA00F9);
        assert_eq!(id.priority, 6);
        assert_eq!(id.pgn, 0xEA00);
        assert_eq!(id.sa, 0xF9);
        assert_eq!(id.da, 0x00);
        assert!(id.pdu1);
    }

    #[test]
    fn test_parse_pdu2_scenario_b() {
        // parse(0x18F00401) -> {priority: 6, pgn: 0xF004, sa: 0x01, da: 0xFF, pdu1: false}
        let id = parse(0x18F00401);
        assert_eq!(id.priority, 6);
        assert_eq!(id.pgn, 0xF004);
        assert_eq!(id.sa, 0x01);
        assert_eq!(id.da, 0xFF);
        assert!(!id.pdu1);
    }

    #[test]
    fn test_roundtrip_pdu1() {
        let original: u32 = 0x18EA00F9;
        let parsed = parse(original);
        let rebuilt = build(J1939IdFields {
            priority: parsed.priority,
            pgn: parsed.pgn,
            sa: parsed.sa,
            da: parsed.da,
        });
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_roundtrip_pdu2_da_discarded() {
        let original: u32 = 0x18F00401;
        let parsed = parse(original);
        assert_eq!(parsed.da, 0xFF);
        let rebuilt = build(J1939IdFields {
            priority: parsed.priority,
            pgn: parsed.pgn,
            sa: parsed.sa,
            da: parsed.da,
        });
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_priority_clamped() {
        let id = build(J1939IdFields {
            priority: 200,
            pgn: 0xF004,
            sa: 0,
            da: 0xFF,
        });
        assert_eq!((id >> 26) & 0x07, 7);
    }

    #[test]
    fn test_roundtrip_all_valid_ids_sampled() {
        // Exhaustive over every id is too slow; sample across PF boundary,
        // the DP bit, and priority/SA extremes to exercise both PDU1 and
        // PDU2 paths.
        for pf in [0u32, 1, 128, 239, 240, 241, 255] {
            for sa in [0u8, 1, 0xF9, 0xFE, 0xFF] {
                for priority in [0u8, 3, 7] {
                    for dp in [0u32, 1] {
                        let ps = 0x42u32;
                        let id = (priority as u32) << 26
                            | (dp << 24)
                            | (pf << 16)
                            | (ps << 8)
                            | sa as u32;
                        let parsed = parse(id);
                        let rebuilt = build(J1939IdFields {
                            priority: parsed.priority,
                            pgn: parsed.pgn,
                            sa: parsed.sa,
                            da: parsed.da,
                        });
                        assert_eq!(
                            rebuilt, id,
                            "roundtrip failed for pf={pf:#x} sa={sa:#x} dp={dp}"
                        );
                    }
                }
            }
        }
    }
}

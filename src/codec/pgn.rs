//! The frozen PGN table: the only PGNs this engine's codec understands.
//!
//! A static, read-only registry rather than a general-purpose catalog:
//! every entry here corresponds to a PGN this crate decodes or emits.

use once_cell::sync::Lazy;

/// REQUEST: ask a peer to send a given PGN.
pub const REQUEST: u32 = 0xEA00;
/// TP.CM: Transport Protocol Connection Management.
pub const TP_CM: u32 = 0xEC00;
/// TP.DT: Transport Protocol Data Transfer.
pub const TP_DT: u32 = 0xEB00;
/// Address Claimed: NAME-bearing address-claim announcement.
pub const ADDRESS_CLAIMED: u32 = 0xEE00;
/// ENGINE_CONTROL_CMD: the frozen proprietary-B command PGN.
pub const ENGINE_CONTROL_CMD: u32 = 0xEF00;
/// ETC1: Electronic Transmission Controller 1.
pub const ETC1: u32 = 0xF003;
/// EEC1: Electronic Engine Controller 1.
pub const EEC1: u32 = 0xF004;
/// DM1: Active Diagnostic Trouble Codes.
pub const DM1: u32 = 0xFECA;
/// DM2: Previously Active Diagnostic Trouble Codes.
pub const DM2: u32 = 0xFECB;
/// ET1: Engine Temperature 1.
pub const ET1: u32 = 0xFEEE;

/// Static metadata about a frozen PGN.
#[derive(Debug, Clone, Copy)]
pub struct PgnDescriptor {
    /// The PGN value.
    pub pgn: u32,
    /// Human-readable name.
    pub name: &'static str,
    /// Expected single-frame payload length. PGNs that are always carried
    /// via the Transport Protocol (none of the ones frozen here) would
    /// leave this as the TP.CM/TP.DT control-frame length instead.
    pub expected_length: u8,
}

/// The full frozen PGN table, in frozen-table order.
pub static PGN_TABLE: &[PgnDescriptor] = &[
    PgnDescriptor {
        pgn: REQUEST,
        name: "REQUEST",
        expected_length: 3,
    },
    PgnDescriptor {
        pgn: TP_CM,
        name: "TP.CM",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: TP_DT,
        name: "TP.DT",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: ADDRESS_CLAIMED,
        name: "Address Claimed",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: ENGINE_CONTROL_CMD,
        name: "ENGINE_CONTROL_CMD",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: ETC1,
        name: "ETC1",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: EEC1,
        name: "EEC1",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: DM1,
        name: "DM1",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: DM2,
        name: "DM2",
        expected_length: 8,
    },
    PgnDescriptor {
        pgn: ET1,
        name: "ET1",
        expected_length: 8,
    },
];

static PGN_BY_NUMBER: Lazy<std::collections::HashMap<u32, &'static PgnDescriptor>> =
    Lazy::new(|| PGN_TABLE.iter().map(|d| (d.pgn, d)).collect());

/// Look up a frozen PGN's descriptor by number.
pub fn get_pgn_descriptor(pgn: u32) -> Option<&'static PgnDescriptor> {
    PGN_BY_NUMBER.get(&pgn).copied()
}

/// List every frozen PGN this codec supports.
pub fn list_supported_pgns() -> Vec<u32> {
    PGN_TABLE.iter().map(|d| d.pgn).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_pgn() {
        let d = get_pgn_descriptor(EEC1).unwrap();
        assert_eq!(d.name, "EEC1");
    }

    #[test]
    fn test_lookup_unknown_pgn() {
        assert!(get_pgn_descriptor(0x1234).is_none());
    }

    #[test]
    fn test_table_has_ten_entries() {
        assert_eq!(PGN_TABLE.len(), 10);
    }
}

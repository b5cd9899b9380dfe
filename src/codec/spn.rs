//! SPN/PGN Codec: scaling/offset encode-decode for the frozen PGN set.
//!
//! Each signal decodes as `raw * resolution + offset`; an all-ones raw
//! value means "not available" and decodes to an invalid, erroring
//! result rather than a number.

use super::pgn;
use crate::error::{J1939Error, Result};

/// Byte order of a multi-byte raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least-significant byte first (the only order used by the frozen PGNs).
    Little,
    /// Most-significant byte first.
    Big,
}

/// Static metadata for a single named signal within a frozen PGN.
#[derive(Debug, Clone, Copy)]
pub struct SpnDescriptor {
    /// SPN number per SAE J1939-71.
    pub spn: u32,
    /// Human-readable name.
    pub name: &'static str,
    /// PGN that carries this SPN.
    pub pgn: u32,
    /// Engineering unit.
    pub units: &'static str,
    /// Scale applied to the raw integer value.
    pub resolution: f64,
    /// Offset applied after scaling.
    pub offset: f64,
    /// Byte offset of the raw field within the payload.
    pub start_byte: u8,
    /// Width of the raw field in bytes.
    pub byte_length: u8,
    /// Byte order of the raw field.
    pub byte_order: ByteOrder,
}

/// SPN descriptors for the signals named in the frozen PGN set.
pub static SPN_TABLE: &[SpnDescriptor] = &[
    SpnDescriptor {
        spn: 190,
        name: "engine_speed",
        pgn: pgn::EEC1,
        units: "rpm",
        resolution: 0.125,
        offset: 0.0,
        start_byte: 4,
        byte_length: 2,
        byte_order: ByteOrder::Little,
    },
    SpnDescriptor {
        spn: 512,
        name: "driver_demand_torque",
        pgn: pgn::EEC1,
        units: "%",
        resolution: 1.0,
        offset: -125.0,
        start_byte: 2,
        byte_length: 1,
        byte_order: ByteOrder::Little,
    },
    SpnDescriptor {
        spn: 513,
        name: "actual_engine_torque",
        pgn: pgn::EEC1,
        units: "%",
        resolution: 1.0,
        offset: -125.0,
        start_byte: 3,
        byte_length: 1,
        byte_order: ByteOrder::Little,
    },
    SpnDescriptor {
        spn: 110,
        name: "coolant_temperature",
        pgn: pgn::ET1,
        units: "degC",
        resolution: 1.0,
        offset: -40.0,
        start_byte: 0,
        byte_length: 1,
        byte_order: ByteOrder::Little,
    },
    SpnDescriptor {
        spn: 191,
        name: "output_shaft_speed",
        pgn: pgn::ETC1,
        units: "rpm",
        resolution: 0.125,
        offset: 0.0,
        start_byte: 0,
        byte_length: 2,
        byte_order: ByteOrder::Little,
    },
    SpnDescriptor {
        spn: 523,
        name: "current_gear",
        pgn: pgn::ETC1,
        units: "gear",
        resolution: 1.0,
        offset: -125.0,
        start_byte: 4,
        byte_length: 1,
        byte_order: ByteOrder::Little,
    },
];

/// A decoded SPN value, carrying validity explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSpn {
    /// SPN number.
    pub spn: u32,
    /// Parameter name.
    pub name: &'static str,
    /// Decoded value in engineering units. Meaningless when `is_valid` is false.
    pub value: f64,
    /// Engineering unit.
    pub unit: &'static str,
    /// Raw value before scaling.
    pub raw: u64,
    /// `false` when the raw field was all-ones ("not available").
    pub is_valid: bool,
    /// `true` when the raw field was all-ones ("not available").
    pub is_error: bool,
}

fn read_raw(data: &[u8], start_byte: u8, byte_length: u8, order: ByteOrder) -> Option<u64> {
    let start = start_byte as usize;
    let len = byte_length as usize;
    let slice = data.get(start..start + len)?;
    let mut raw: u64 = 0;
    match order {
        ByteOrder::Little => {
            for (i, b) in slice.iter().enumerate() {
                raw |= (*b as u64) << (8 * i);
            }
        }
        ByteOrder::Big => {
            for b in slice.iter() {
                raw = (raw << 8) | *b as u64;
            }
        }
    }
    Some(raw)
}

fn write_raw(buf: &mut [u8], start_byte: u8, byte_length: u8, order: ByteOrder, raw: u64) {
    let start = start_byte as usize;
    let len = byte_length as usize;
    match order {
        ByteOrder::Little => {
            for i in 0..len {
                buf[start + i] = ((raw >> (8 * i)) & 0xFF) as u8;
            }
        }
        ByteOrder::Big => {
            for i in 0..len {
                buf[start + i] = ((raw >> (8 * (len - 1 - i))) & 0xFF) as u8;
            }
        }
    }
}

/// Decode a single SPN's raw field out of a PGN payload.
///
/// Returns `None` if the descriptor's byte range falls outside `data`.
pub fn decode_spn(desc: &SpnDescriptor, data: &[u8]) -> Option<DecodedSpn> {
    let raw = read_raw(data, desc.start_byte, desc.byte_length, desc.byte_order)?;
    let all_ones = (1u64 << (8 * desc.byte_length as u32)) - 1;
    let is_error = raw == all_ones;
    let value = if is_error {
        0.0
    } else {
        raw as f64 * desc.resolution + desc.offset
    };
    Some(DecodedSpn {
        spn: desc.spn,
        name: desc.name,
        value,
        unit: desc.units,
        raw,
        is_valid: !is_error,
        is_error,
    })
}

/// Encode an engineering-unit value back into a raw field, writing it into
/// `buf` at the descriptor's byte range.
pub fn encode_spn(desc: &SpnDescriptor, buf: &mut [u8], value: f64) {
    let raw = ((value - desc.offset) / desc.resolution).round() as u64;
    write_raw(buf, desc.start_byte, desc.byte_length, desc.byte_order, raw);
}

/// Every SPN descriptor registered for a given PGN.
pub fn spns_for_pgn(pgn: u32) -> impl Iterator<Item = &'static SpnDescriptor> {
    SPN_TABLE.iter().filter(move |d| d.pgn == pgn)
}

// --- Per-PGN convenience encode/decode for the reference ECUs ---

/// EEC1 (0xF004): engine speed, driver-demand torque, actual engine torque.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eec1 {
    /// Engine speed in rpm, or `None` if "not available".
    pub engine_speed_rpm: Option<f64>,
    /// Driver-demand torque percent, or `None` if "not available".
    pub driver_demand_torque_pct: Option<f64>,
    /// Actual engine torque percent, or `None` if "not available".
    pub actual_engine_torque_pct: Option<f64>,
    /// Source address carried in byte 6.
    pub source_address: u8,
}

/// Decode an 8-byte EEC1 payload.
pub fn decode_eec1(data: &[u8; 8]) -> Eec1 {
    let speed = decode_spn(&SPN_TABLE[0], data).filter(|d| d.is_valid).map(|d| d.value);
    let demand = decode_spn(&SPN_TABLE[1], data).filter(|d| d.is_valid).map(|d| d.value);
    let actual = decode_spn(&SPN_TABLE[2], data).filter(|d| d.is_valid).map(|d| d.value);
    Eec1 {
        engine_speed_rpm: speed,
        driver_demand_torque_pct: demand,
        actual_engine_torque_pct: actual,
        source_address: data[6],
    }
}

/// Encode an EEC1 payload. Unset fields serialize to `0xFF`.
pub fn encode_eec1(eec1: &Eec1) -> [u8; 8] {
    let mut buf = [0xFFu8; 8];
    if let Some(v) = eec1.engine_speed_rpm {
        encode_spn(&SPN_TABLE[0], &mut buf, v);
    }
    if let Some(v) = eec1.driver_demand_torque_pct {
        encode_spn(&SPN_TABLE[1], &mut buf, v);
    }
    if let Some(v) = eec1.actual_engine_torque_pct {
        encode_spn(&SPN_TABLE[2], &mut buf, v);
    }
    buf[6] = eec1.source_address;
    buf
}

/// ET1 (0xFEEE): engine temperature 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Et1 {
    /// Coolant temperature in degrees Celsius, or `None` if "not available".
    pub coolant_temp_c: Option<f64>,
}

/// Decode an 8-byte ET1 payload.
pub fn decode_et1(data: &[u8; 8]) -> Et1 {
    let temp = decode_spn(&SPN_TABLE[3], data).filter(|d| d.is_valid).map(|d| d.value);
    Et1 { coolant_temp_c: temp }
}

/// Encode an ET1 payload. Unset fields serialize to `0xFF`.
pub fn encode_et1(et1: &Et1) -> [u8; 8] {
    let mut buf = [0xFFu8; 8];
    if let Some(v) = et1.coolant_temp_c {
        encode_spn(&SPN_TABLE[3], &mut buf, v);
    }
    buf
}

/// ETC1 (0xF003): electronic transmission controller 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Etc1 {
    /// Output-shaft speed in rpm, or `None` if "not available".
    pub output_shaft_speed_rpm: Option<f64>,
    /// Current gear, or `None` if "not available".
    pub current_gear: Option<i32>,
}

/// Decode an 8-byte ETC1 payload.
pub fn decode_etc1(data: &[u8; 8]) -> Etc1 {
    let speed = decode_spn(&SPN_TABLE[4], data).filter(|d| d.is_valid).map(|d| d.value);
    let gear = decode_spn(&SPN_TABLE[5], data)
        .filter(|d| d.is_valid)
        .map(|d| d.value as i32);
    Etc1 {
        output_shaft_speed_rpm: speed,
        current_gear: gear,
    }
}

/// Encode an ETC1 payload. Unset fields serialize to `0xFF`.
pub fn encode_etc1(etc1: &Etc1) -> [u8; 8] {
    let mut buf = [0xFFu8; 8];
    if let Some(v) = etc1.output_shaft_speed_rpm {
        encode_spn(&SPN_TABLE[4], &mut buf, v);
    }
    if let Some(v) = etc1.current_gear {
        encode_spn(&SPN_TABLE[5], &mut buf, v as f64);
    }
    buf
}

/// ENGINE_CONTROL_CMD (0xEF00): the frozen proprietary-B command.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineControlCmd {
    /// Requested target rpm, 0..=8000.
    pub target_rpm: u16,
    /// Enable flag.
    pub enable: bool,
    /// Bit 0 set means OVERHEAT; other bits reserved-zero.
    pub fault_flags: u8,
}

/// Bit 0 of `fault_flags`: overheat condition.
pub const FAULT_FLAG_OVERHEAT: u8 = 0x01;

/// Decode an ENGINE_CONTROL_CMD payload. The payload must carry at least
/// 3 bytes (rpm LSB/MSB + enable); shorter payloads are rejected.
pub fn decode_engine_control_cmd(data: &[u8]) -> Result<EngineControlCmd> {
    if data.len() < 3 {
        return Err(J1939Error::invalid_frame(format!(
            "ENGINE_CONTROL_CMD payload too short: {} bytes",
            data.len()
        )));
    }
    let target_rpm = u16::from_le_bytes([data[0], data[1]]);
    let enable = data[2] == 1;
    let fault_flags = data.get(3).copied().unwrap_or(0xFF);
    Ok(EngineControlCmd {
        target_rpm,
        enable,
        fault_flags,
    })
}

/// Encode an ENGINE_CONTROL_CMD payload.
pub fn encode_engine_control_cmd(cmd: &EngineControlCmd) -> [u8; 8] {
    let mut buf = [0xFFu8; 8];
    let rpm = cmd.target_rpm.to_le_bytes();
    buf[0] = rpm[0];
    buf[1] = rpm[1];
    buf[2] = if cmd.enable { 1 } else { 0 };
    buf[3] = cmd.fault_flags;
    buf
}

/// REQUEST (0xEA00): 3-byte little-endian PGN payload.
pub fn decode_request(data: &[u8]) -> Result<u32> {
    if data.len() < 3 {
        return Err(J1939Error::invalid_frame(format!(
            "REQUEST payload too short: {} bytes",
            data.len()
        )));
    }
    Ok(data[0] as u32 | (data[1] as u32) << 8 | (data[2] as u32) << 16)
}

/// Encode a REQUEST payload for the given PGN.
pub fn encode_request(requested_pgn: u32) -> [u8; 3] {
    [
        (requested_pgn & 0xFF) as u8,
        ((requested_pgn >> 8) & 0xFF) as u8,
        ((requested_pgn >> 16) & 0xFF) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_c_eec1_decode() {
        // [0xF0, 0xFF, 0xFF, 0xFF, 0x20, 0x4E, 0xFF, 0xFF] -> speed 2500.0
        let data = [0xF0, 0xFF, 0xFF, 0xFF, 0x20, 0x4E, 0xFF, 0xFF];
        let eec1 = decode_eec1(&data);
        assert_eq!(eec1.engine_speed_rpm, Some(2500.0));
        assert_eq!(eec1.driver_demand_torque_pct, None); // byte2 = 0xFF, not available
    }

    #[test]
    fn test_all_ones_is_not_available() {
        let desc = &SPN_TABLE[0];
        let decoded = decode_spn(desc, &[0, 0, 0, 0, 0xFF, 0xFF, 0, 0]).unwrap();
        assert!(!decoded.is_valid);
        assert!(decoded.is_error);
    }

    #[test]
    fn test_scaling_roundtrip() {
        for desc in SPN_TABLE {
            let mut buf = [0u8; 8];
            let test_value = 42.0 * desc.resolution + desc.offset;
            encode_spn(desc, &mut buf, test_value);
            let decoded = decode_spn(desc, &buf).unwrap();
            assert!(
                (decoded.value - test_value).abs() <= desc.resolution,
                "spn {} roundtrip drift too large",
                desc.spn
            );
        }
    }

    #[test]
    fn test_engine_control_cmd_roundtrip() {
        let cmd = EngineControlCmd {
            target_rpm: 1500,
            enable: true,
            fault_flags: 0,
        };
        let bytes = encode_engine_control_cmd(&cmd);
        let decoded = decode_engine_control_cmd(&bytes).unwrap();
        assert_eq!(decoded.target_rpm, 1500);
        assert!(decoded.enable);
    }

    #[test]
    fn test_scenario_d_engine_control_cmd_decode() {
        // payload [0xDC, 0x05, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF] -> target_rpm 1500
        let data = [0xDC, 0x05, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let cmd = decode_engine_control_cmd(&data).unwrap();
        assert_eq!(cmd.target_rpm, 1500);
        assert!(cmd.enable);
        assert_eq!(cmd.fault_flags & FAULT_FLAG_OVERHEAT, 0);
    }

    #[test]
    fn test_request_roundtrip() {
        let bytes = encode_request(pgn::EEC1);
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded, pgn::EEC1);
    }
}

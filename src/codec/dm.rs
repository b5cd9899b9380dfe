//! DM1/DM2 bit-packing: lamp flags and Diagnostic Trouble Code encoding.
//!
//! Shared between the SPN/PGN codec (decoding an incoming DM1/DM2 frame
//! into named fields) and the diagnostics manager (aggregating decoded
//! DTCs per source address), so the exact byte layout lives in one place.

/// The four independent lamp flags carried in DM1/DM2 byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LampStatus {
    /// Malfunction Indicator Lamp, bit 2.
    pub mil: bool,
    /// Flash request, bit 3.
    pub flash: bool,
    /// Amber warning lamp, bit 5.
    pub amber: bool,
    /// Red stop / protect lamp, bit 6.
    pub protect: bool,
}

/// Decode the DM1/DM2 lamp byte (byte 0 of the payload).
pub fn decode_lamps(byte: u8) -> LampStatus {
    LampStatus {
        mil: byte & 0x04 != 0,
        flash: byte & 0x08 != 0,
        amber: byte & 0x20 != 0,
        protect: byte & 0x40 != 0,
    }
}

/// Encode a [`LampStatus`] back into the DM1/DM2 lamp byte.
pub fn encode_lamps(lamps: LampStatus) -> u8 {
    let mut byte = 0u8;
    if lamps.mil {
        byte |= 0x04;
    }
    if lamps.flash {
        byte |= 0x08;
    }
    if lamps.amber {
        byte |= 0x20;
    }
    if lamps.protect {
        byte |= 0x40;
    }
    byte
}

/// A single Diagnostic Trouble Code: SPN + FMI + OC + CM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dtc {
    /// Suspect Parameter Number, 21 bits.
    pub spn: u32,
    /// Failure Mode Indicator, 5 bits.
    pub fmi: u8,
    /// Conversion Method, 1 bit.
    pub cm: u8,
    /// Occurrence Count, 7 bits.
    pub oc: u8,
}

impl Dtc {
    /// Decode one DTC from its four packed payload bytes.
    ///
    /// `SPN = byte1 | (byte2 << 8) | ((byte3 & 0x1F) << 16)`,
    /// `CM = (byte3 >> 5) & 0x01`, `FMI = byte4 & 0x1F`, `OC = (byte4 >> 5) & 0x07`.
    pub fn decode(bytes: [u8; 4]) -> Self {
        let [b1, b2, b3, b4] = bytes;
        Dtc {
            spn: b1 as u32 | ((b2 as u32) << 8) | (((b3 & 0x1F) as u32) << 16),
            fmi: b4 & 0x1F,
            cm: (b3 >> 5) & 0x01,
            oc: (b4 >> 5) & 0x07,
        }
    }

    /// Encode this DTC back into its four packed payload bytes.
    pub fn encode(&self) -> [u8; 4] {
        let b1 = (self.spn & 0xFF) as u8;
        let b2 = ((self.spn >> 8) & 0xFF) as u8;
        let b3 = (((self.spn >> 16) & 0x1F) as u8) | ((self.cm & 0x01) << 5);
        let b4 = (self.fmi & 0x1F) | ((self.oc & 0x07) << 5);
        [b1, b2, b3, b4]
    }

    /// `true` if the packed bytes are the all-zero "no fault" sentinel.
    fn is_no_fault(bytes: [u8; 4]) -> bool {
        bytes == [0, 0, 0, 0]
    }
}

/// A decoded DM1/DM2 payload: lamp flags plus zero or more DTCs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DmReport {
    /// Lamp status from byte 0.
    pub lamps: LampStatus,
    /// Active DTCs. Empty when the payload's first DTC slot was the
    /// all-zero "no fault" sentinel.
    pub dtcs: Vec<Dtc>,
}

/// Decode a DM1 or DM2 payload (both share this layout).
///
/// `data` shorter than 8 bytes is rejected. Up to three DTCs are packed
/// into an 8-byte payload (lamp byte + 4 bytes * up to... in practice one
/// DTC per 8-byte frame; additional DTCs arrive via the Transport Protocol
/// in a longer reassembled payload, 4 bytes each after the lamp byte).
pub fn decode_dm(data: &[u8]) -> crate::error::Result<DmReport> {
    if data.len() < 8 {
        return Err(crate::error::J1939Error::invalid_frame(format!(
            "DM1/DM2 payload too short: {} bytes",
            data.len()
        )));
    }

    let lamps = decode_lamps(data[0]);
    let mut dtcs = Vec::new();
    let mut offset = 1;
    while offset + 4 <= data.len() {
        let chunk: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
        if Dtc::is_no_fault(chunk) {
            break;
        }
        dtcs.push(Dtc::decode(chunk));
        offset += 4;
    }

    Ok(DmReport { lamps, dtcs })
}

/// Encode a DM1/DM2 report back to wire bytes, padding to 8 bytes with
/// `0xFF`. At most one DTC is encoded in a single-frame payload; more
/// require the Transport Protocol engine to carry a longer buffer.
pub fn encode_dm(report: &DmReport) -> Vec<u8> {
    let mut out = vec![encode_lamps(report.lamps)];
    if let Some(first) = report.dtcs.first() {
        out.extend_from_slice(&first.encode());
    } else {
        out.extend_from_slice(&[0, 0, 0, 0]);
    }
    while out.len() < 8 {
        out.push(0xFF);
    }
    out
}

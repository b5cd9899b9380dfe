//! Transmission ECU: broadcasts ETC1 and answers REQUESTs for it.

use crate::codec::pgn;
use crate::codec::spn::{encode_etc1, Etc1};
use crate::message::J1939Message;
use crate::port::PortSender;
use crate::sim::Ecu;

/// Default source address for the Transmission ECU.
pub const SOURCE_ADDRESS: u8 = 0x03;

/// A simulated transmission controller: tracks output-shaft speed and
/// current gear, both following the Engine ECU's rpm at a fixed ratio.
pub struct TransmissionEcu {
    sa: u8,
    sender: Option<PortSender>,
    broadcast_rate_ms: u64,
    output_shaft_speed_rpm: f64,
    current_gear: i32,
}

impl TransmissionEcu {
    /// Construct a Transmission ECU at the default source address.
    pub fn new() -> Self {
        Self {
            sa: SOURCE_ADDRESS,
            sender: None,
            broadcast_rate_ms: 100,
            output_shaft_speed_rpm: 0.0,
            current_gear: 0,
        }
    }

    /// Feed the engine's current rpm in, so ETC1 tracks it. In a fuller
    /// simulation this would arrive as an EEC1 subscription; wired directly
    /// here since only one gear ratio is modeled.
    pub fn set_input_rpm(&mut self, engine_rpm: f64) {
        const GEAR_RATIO: f64 = 0.5;
        self.output_shaft_speed_rpm = engine_rpm * GEAR_RATIO;
        self.current_gear = if engine_rpm > 1200.0 { 3 } else { 1 };
    }

    fn broadcast_etc1(&self) {
        let etc1 = Etc1 {
            output_shaft_speed_rpm: Some(self.output_shaft_speed_rpm),
            current_gear: Some(self.current_gear),
        };
        if let Some(sender) = &self.sender {
            sender.send_pgn(pgn::ETC1, encode_etc1(&etc1).to_vec(), 0xFF);
        }
    }
}

impl Default for TransmissionEcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecu for TransmissionEcu {
    fn name(&self) -> &str {
        "transmission"
    }

    fn source_address(&self) -> u8 {
        self.sa
    }

    fn broadcast_rate_ms(&self) -> u64 {
        self.broadcast_rate_ms
    }

    fn bind_j1939_port(&mut self, sender: PortSender) {
        self.sender = Some(sender);
    }

    fn on_tick(&mut self, now_ms: u64, _delta_ms: u64) {
        if now_ms % self.broadcast_rate_ms == 0 {
            self.broadcast_etc1();
        }
    }

    fn on_pgn(&mut self, message: &J1939Message) {
        if message.pgn == crate::codec::pgn::EEC1 && message.data.len() == 8 {
            let data: [u8; 8] = message.data.as_ref().try_into().unwrap();
            let eec1 = crate::codec::spn::decode_eec1(&data);
            if let Some(rpm) = eec1.engine_speed_rpm {
                self.set_input_rpm(rpm);
            }
        }
    }

    fn on_request(&mut self, requested_pgn: u32, requester_sa: u8) {
        if requested_pgn != pgn::ETC1 {
            return;
        }
        if let Some(sender) = &self.sender {
            let etc1 = Etc1 {
                output_shaft_speed_rpm: Some(self.output_shaft_speed_rpm),
                current_gear: Some(self.current_gear),
            };
            sender.send_pgn(pgn::ETC1, encode_etc1(&etc1).to_vec(), requester_sa);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_engine_rpm_at_fixed_ratio() {
        let mut tx = TransmissionEcu::new();
        tx.set_input_rpm(2000.0);
        assert_eq!(tx.output_shaft_speed_rpm, 1000.0);
        assert_eq!(tx.current_gear, 3);
    }

    #[test]
    fn test_low_rpm_selects_first_gear() {
        let mut tx = TransmissionEcu::new();
        tx.set_input_rpm(800.0);
        assert_eq!(tx.current_gear, 1);
    }
}

//! Engine ECU: broadcasts EEC1/ET1, ramps rpm toward a commanded target,
//! and answers REQUESTs for its own PGNs.

use crate::codec::pgn;
use crate::codec::spn::{decode_engine_control_cmd, encode_eec1, encode_et1, Eec1, Et1, FAULT_FLAG_OVERHEAT};
use crate::message::J1939Message;
use crate::port::PortSender;
use crate::sim::Ecu;

/// Default source address for the Engine ECU.
pub const SOURCE_ADDRESS: u8 = 0x00;
/// Rpm gained or lost per simulated second while ramping toward target.
const RAMP_RATE_RPM_PER_SEC: f64 = 500.0;
/// Coolant temperature the engine idles at absent any fault, in degC.
const NOMINAL_COOLANT_TEMP_C: f64 = 85.0;
/// Coolant temperature reported while the OVERHEAT fault flag is set.
const OVERHEAT_COOLANT_TEMP_C: f64 = 115.0;

/// A simulated diesel engine controller.
pub struct EngineEcu {
    sa: u8,
    sender: Option<PortSender>,
    broadcast_rate_ms: u64,
    current_rpm: f64,
    target_rpm: f64,
    enabled: bool,
    overheat: bool,
}

impl EngineEcu {
    /// Construct an Engine ECU at the default source address, idling.
    pub fn new() -> Self {
        Self {
            sa: SOURCE_ADDRESS,
            sender: None,
            broadcast_rate_ms: 100,
            current_rpm: 0.0,
            target_rpm: 0.0,
            enabled: false,
            overheat: false,
        }
    }

    /// Current rpm, for test assertions and external observers.
    pub fn current_rpm(&self) -> f64 {
        self.current_rpm
    }

    fn coolant_temp_c(&self) -> f64 {
        if self.overheat {
            OVERHEAT_COOLANT_TEMP_C
        } else {
            NOMINAL_COOLANT_TEMP_C
        }
    }

    fn broadcast_eec1(&self) {
        let eec1 = Eec1 {
            engine_speed_rpm: Some(self.current_rpm),
            driver_demand_torque_pct: Some(0.0),
            actual_engine_torque_pct: Some(0.0),
            source_address: self.sa,
        };
        if let Some(sender) = &self.sender {
            sender.send_pgn(pgn::EEC1, encode_eec1(&eec1).to_vec(), 0xFF);
        }
    }

    fn broadcast_et1(&self) {
        let et1 = Et1 {
            coolant_temp_c: Some(self.coolant_temp_c()),
        };
        if let Some(sender) = &self.sender {
            sender.send_pgn(pgn::ET1, encode_et1(&et1).to_vec(), 0xFF);
        }
    }
}

impl Default for EngineEcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecu for EngineEcu {
    fn name(&self) -> &str {
        "engine"
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

    fn on_tick(&mut self, now_ms: u64, delta_ms: u64) {
        if self.enabled {
            let max_step = RAMP_RATE_RPM_PER_SEC * (delta_ms as f64 / 1000.0);
            let diff = self.target_rpm - self.current_rpm;
            self.current_rpm += diff.clamp(-max_step, max_step);
        } else {
            let max_step = RAMP_RATE_RPM_PER_SEC * (delta_ms as f64 / 1000.0);
            self.current_rpm = (self.current_rpm - max_step).max(0.0);
        }

        if now_ms % self.broadcast_rate_ms == 0 {
            self.broadcast_eec1();
            self.broadcast_et1();
        }
    }

    fn on_pgn(&mut self, message: &J1939Message) {
        if message.pgn != pgn::ENGINE_CONTROL_CMD {
            return;
        }
        if message.data.len() < 3 {
            return;
        }
        if let Ok(cmd) = decode_engine_control_cmd(&message.data) {
            self.overheat = cmd.fault_flags & FAULT_FLAG_OVERHEAT != 0;
            if cmd.enable && cmd.target_rpm <= 8000 {
                self.enabled = true;
                self.target_rpm = cmd.target_rpm as f64;
            }
            if self.overheat {
                self.target_rpm = 0.0;
            }
        }
    }

    fn on_request(&mut self, requested_pgn: u32, requester_sa: u8) {
        let sender = match &self.sender {
            Some(s) => s,
            None => return,
        };
        match requested_pgn {
            pgn::EEC1 => {
                let eec1 = Eec1 {
                    engine_speed_rpm: Some(self.current_rpm),
                    driver_demand_torque_pct: Some(0.0),
                    actual_engine_torque_pct: Some(0.0),
                    source_address: self.sa,
                };
                sender.send_pgn(pgn::EEC1, encode_eec1(&eec1).to_vec(), requester_sa);
            }
            pgn::ET1 => {
                let et1 = Et1 {
                    coolant_temp_c: Some(self.coolant_temp_c()),
                };
                sender.send_pgn(pgn::ET1, encode_et1(&et1).to_vec(), requester_sa);
            }
            _ => {}
        }
    }
}

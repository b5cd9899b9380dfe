//! Vehicle profile configuration loading.
//!
//! An unknown ECU name is rejected up front, at deserialize time, rather
//! than discovered later when the simulation tries to spawn it.

use serde::{Deserialize, Serialize};

use crate::error::{J1939Error, Result};

/// Top-level vehicle profile: the bus parameters plus the ECUs to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Human-readable profile name.
    pub name: String,
    /// Virtual bus parameters.
    pub bus: BusConfig,
    /// ECUs to instantiate.
    pub ecus: Vec<EcuConfig>,
    /// Simulation timing parameters.
    pub simulation: SimulationConfig,
}

/// Virtual CAN bus parameters. `bitrate` is carried for realism and
/// external reporting; the in-process bus has no notion of wire speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Logical bus/interface name.
    pub interface: String,
    /// Nominal bitrate in bit/s, e.g. `250_000`.
    pub bitrate: u32,
}

/// One ECU entry in a vehicle profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuConfig {
    /// Must match one of the built-in reference ECU names
    /// (`"engine"`, `"transmission"`, `"diagnostic_tool"`).
    pub name: String,
    /// Source address to claim. Defaults to the ECU's own default if omitted.
    #[serde(default)]
    pub address: Option<u8>,
    /// Broadcast/cycle rate override, in milliseconds.
    #[serde(default)]
    pub rate_ms: Option<u64>,
    /// Whether to start this ECU automatically.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Scheduler timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed scheduler tick size, in milliseconds.
    pub tick_ms: u64,
    /// Total simulated duration to run, in milliseconds.
    pub duration_ms: u64,
}

/// The set of reference ECU names a vehicle profile may refer to.
pub const KNOWN_ECU_NAMES: &[&str] = &["engine", "transmission", "diagnostic_tool"];

impl VehicleProfile {
    /// Parse a vehicle profile from JSON. Unknown top-level fields are
    /// ignored; an unknown `ecus[].name` is rejected with
    /// [`J1939Error::Configuration`].
    pub fn from_json(text: &str) -> Result<Self> {
        let profile: VehicleProfile = serde_json::from_str(text)
            .map_err(|e| J1939Error::config(format!("invalid vehicle profile JSON: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Parse a vehicle profile from TOML, for the CLI front-end.
    #[cfg(feature = "cli")]
    pub fn from_toml(text: &str) -> Result<Self> {
        let profile: VehicleProfile = toml::from_str(text)
            .map_err(|e| J1939Error::config(format!("invalid vehicle profile TOML: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        for ecu in &self.ecus {
            if !KNOWN_ECU_NAMES.contains(&ecu.name.as_str()) {
                return Err(J1939Error::config(format!("unknown ECU name: {}", ecu.name)));
            }
        }
        if self.simulation.tick_ms == 0 {
            return Err(J1939Error::config("simulation.tick_ms must be nonzero"));
        }
        Ok(())
    }
}

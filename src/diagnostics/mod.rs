//! Diagnostics Manager: aggregates DM1/DM2 traffic into a fleet-wide view.
//!
//! Active faults are keyed by source address and replaced wholesale on
//! each fresh DM1; DM2's previously-active set is tracked separately and
//! does not count toward the active-fault summary.

use std::collections::HashMap;

use crate::codec::dm::{decode_dm, DmReport, LampStatus};

/// Snapshot of one ECU's diagnostic state as of its most recent DM1/DM2.
#[derive(Debug, Clone, Default)]
pub struct EcuDiagnostics {
    /// Lamp state from the most recent DM1.
    pub lamps: LampStatus,
    /// Currently active DTCs (from DM1).
    pub active: Vec<crate::codec::dm::Dtc>,
    /// Previously active DTCs (from DM2), retained until superseded.
    pub previously_active: Vec<crate::codec::dm::Dtc>,
}

/// A fleet-wide summary across every ECU that has reported diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSummary {
    /// Total active DTCs across all reporting ECUs.
    pub total_active_dtcs: usize,
    /// Number of distinct source addresses with at least one active DTC.
    pub devices_with_faults: usize,
    /// Total MIL-lit ECUs.
    pub mil_count: usize,
    /// Total protect-lamp-lit ECUs.
    pub protect_count: usize,
    /// `true` when any ECU has MIL or protect lit: the bus has a fault
    /// severe enough that a supervisor should not ignore it.
    pub has_critical_faults: bool,
}

/// Aggregates DM1 (active) and DM2 (previously active) reports, keyed by
/// the reporting ECU's source address.
#[derive(Default)]
pub struct DiagnosticsManager {
    by_sa: HashMap<u8, EcuDiagnostics>,
}

impl DiagnosticsManager {
    /// Construct an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a DM1 payload from `sa`, replacing its prior active set.
    pub fn ingest_dm1(&mut self, sa: u8, data: &[u8]) -> crate::error::Result<()> {
        let report = decode_dm(data)?;
        let entry = self.by_sa.entry(sa).or_default();
        entry.lamps = report.lamps;
        entry.active = report.dtcs;
        Ok(())
    }

    /// Ingest a DM2 payload from `sa`, replacing its prior previously-active set.
    pub fn ingest_dm2(&mut self, sa: u8, data: &[u8]) -> crate::error::Result<()> {
        let report: DmReport = decode_dm(data)?;
        let entry = self.by_sa.entry(sa).or_default();
        entry.previously_active = report.dtcs;
        Ok(())
    }

    /// This ECU's last-known diagnostic state, if it has ever reported.
    pub fn for_sa(&self, sa: u8) -> Option<&EcuDiagnostics> {
        self.by_sa.get(&sa)
    }

    /// Every source address that has reported diagnostics at least once.
    pub fn known_sources(&self) -> impl Iterator<Item = u8> + '_ {
        self.by_sa.keys().copied()
    }

    /// Roll every ECU's current state up into one fleet-wide summary.
    pub fn summary(&self) -> DiagnosticSummary {
        let mut s = DiagnosticSummary::default();
        for diag in self.by_sa.values() {
            if !diag.active.is_empty() {
                s.devices_with_faults += 1;
            }
            s.total_active_dtcs += diag.active.len();
            if diag.lamps.mil {
                s.mil_count += 1;
            }
            if diag.lamps.protect {
                s.protect_count += 1;
            }
        }
        s.has_critical_faults = s.mil_count > 0 || s.protect_count > 0;
        s
    }
}

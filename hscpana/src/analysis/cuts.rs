//! Preselection thresholds.
//!
//! One flat table of named cut constants, fixed for a run. Bounds are
//! inclusive: a value exactly at a threshold passes.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Threshold table consulted by the preselection gates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreselectionCuts {
    // Acceptance
    pub max_eta: f64,
    pub min_muon_stations: u32,

    // Tracker hit pattern
    pub min_hits: u32,
    pub min_pixel_hits: u32,
    pub min_valid_fraction: f64,
    pub max_missing_till_last: u32,
    pub min_valid_fraction_till_last: f64,

    // Number of dE/dx measurements
    pub min_dedx_measurements: usize,

    // Combined pixel probQ upper bound
    pub max_track_prob_q: f64,

    // Time-of-flight fit quality
    pub min_tof_ndof: u32,
    pub min_tof_ndof_dt: u32,
    pub min_tof_ndof_csc: u32,
    pub max_tof_err: f64,

    // Track fit
    pub max_chi2_per_ndof: f64,
    pub max_pt_err: f64,

    // Kinematics and ionization
    pub min_pt: f64,
    pub min_is: f64,
    // lower bound on Ih, upper bound for multiply charged candidates
    pub ih_bound: f64,
    pub min_tof: f64,

    // Impact parameters in cm
    pub max_v3d: f64,
    pub max_dxy: f64,
    pub max_dz: f64,
    // absolute impact parameter window when cosmic sidebands are modelled
    pub cosmic_window: f64,

    // Isolation
    pub max_tk_isolation: f64,
    pub max_calo_isolation: f64,
    pub max_rel_tk_isolation: f64,

    // Cosmic muon rejection for standalone tracks
    pub max_no_vertex_dr: f64,
    pub cosmic_timing_window: f64,
    pub min_segment_eta_sep: f64,
    pub noisy_phi_low: f64,
    pub noisy_phi_high: f64,
    pub cosmic_open_angle: f64,

    // Muon system regions, monitoring only
    pub dt_region: f64,
    pub csc_region: f64,
    pub cosmic_min_dz: f64,
    pub cosmic_max_dz: f64,
}

impl Default for PreselectionCuts {
    fn default() -> Self {
        Self {
            max_eta: 2.1,
            min_muon_stations: 2,

            min_hits: 8,
            min_pixel_hits: 2,
            min_valid_fraction: 0.8,
            max_missing_till_last: 99_999,
            min_valid_fraction_till_last: -99_999.0,

            min_dedx_measurements: 6,

            // 1.0 keeps every non degenerate track
            max_track_prob_q: 1.0,

            min_tof_ndof: 8,
            min_tof_ndof_dt: 6,
            min_tof_ndof_csc: 6,
            max_tof_err: 0.15,

            max_chi2_per_ndof: 5.0,
            max_pt_err: 0.25,

            min_pt: 55.0,
            min_is: 0.0,
            ih_bound: 3.0,
            min_tof: 1.0,

            max_v3d: 99_999.0,
            max_dxy: 0.02,
            max_dz: 0.1,
            cosmic_window: 4.0,

            max_tk_isolation: 50.0,
            max_calo_isolation: 0.3,
            max_rel_tk_isolation: 9_999_999.0,

            max_no_vertex_dr: 0.4,
            cosmic_timing_window: 5.0,
            min_segment_eta_sep: 0.1,
            noisy_phi_low: 1.2,
            noisy_phi_high: 1.9,
            cosmic_open_angle: 2.8,

            dt_region: 0.9,
            csc_region: 0.9,
            cosmic_min_dz: 70.0,
            cosmic_max_dz: 120.0,
        }
    }
}

impl PreselectionCuts {
    /// Create a loose table for control samples and efficiency studies.
    pub fn loose() -> Self {
        Self {
            min_hits: 5,
            min_pixel_hits: 1,
            min_valid_fraction: 0.5,
            min_dedx_measurements: 3,
            min_tof_ndof: 4,
            min_tof_ndof_dt: 3,
            min_tof_ndof_csc: 3,
            max_tof_err: 0.3,
            max_chi2_per_ndof: 10.0,
            max_pt_err: 0.5,
            min_pt: 40.0,
            ih_bound: 0.0,
            max_dxy: 0.5,
            max_dz: 0.5,
            max_tk_isolation: 100.0,
            max_calo_isolation: 1.0,
            ..Default::default()
        }
    }

    /// Create a strict table for a low background signal region.
    pub fn strict() -> Self {
        Self {
            min_hits: 10,
            min_pixel_hits: 3,
            min_valid_fraction: 0.9,
            max_missing_till_last: 1,
            min_valid_fraction_till_last: 0.8,
            min_dedx_measurements: 10,
            max_track_prob_q: 0.7,
            min_tof_ndof: 8,
            max_tof_err: 0.07,
            max_chi2_per_ndof: 3.0,
            max_pt_err: 0.15,
            min_pt: 65.0,
            min_is: 0.05,
            ih_bound: 3.5,
            max_dxy: 0.01,
            max_dz: 0.05,
            max_tk_isolation: 15.0,
            max_calo_isolation: 0.2,
            max_rel_tk_isolation: 0.15,
            ..Default::default()
        }
    }

    /// Reject tables whose bounds cannot be satisfied.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 9] = [
            (self.max_eta > 0.0, "max_eta must be positive"),
            (self.min_pt >= 0.0, "min_pt must not be negative"),
            (
                (0.0..=1.0).contains(&self.min_valid_fraction),
                "min_valid_fraction must lie in [0, 1]",
            ),
            (
                self.max_track_prob_q > 0.0 && self.max_track_prob_q <= 1.0,
                "max_track_prob_q must lie in (0, 1]",
            ),
            (self.max_tof_err > 0.0, "max_tof_err must be positive"),
            (self.max_chi2_per_ndof > 0.0, "max_chi2_per_ndof must be positive"),
            (
                self.max_dxy > 0.0 && self.max_dz > 0.0 && self.max_v3d > 0.0,
                "impact parameter bounds must be positive",
            ),
            (
                self.noisy_phi_low <= self.noisy_phi_high,
                "noisy phi window is inverted",
            ),
            (
                self.cosmic_min_dz <= self.cosmic_max_dz,
                "cosmic dz window is inverted",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(AnalysisError::Config(msg.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        PreselectionCuts::default().validate().unwrap();
        PreselectionCuts::loose().validate().unwrap();
        PreselectionCuts::strict().validate().unwrap();
    }

    #[test]
    fn test_presets_are_ordered() {
        let loose = PreselectionCuts::loose();
        let nominal = PreselectionCuts::default();
        let strict = PreselectionCuts::strict();
        assert!(loose.min_pt < nominal.min_pt && nominal.min_pt < strict.min_pt);
        assert!(loose.max_dz > nominal.max_dz && nominal.max_dz > strict.max_dz);
        assert!(loose.min_hits < nominal.min_hits && nominal.min_hits < strict.min_hits);
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let cuts = PreselectionCuts { max_eta: -1.0, ..Default::default() };
        assert!(matches!(cuts.validate(), Err(AnalysisError::Config(_))));

        let cuts = PreselectionCuts { max_track_prob_q: 0.0, ..Default::default() };
        assert!(cuts.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cuts: PreselectionCuts = serde_json::from_str(r#"{"min_pt": 70.0}"#).unwrap();
        assert_eq!(cuts.min_pt, 70.0);
        assert_eq!(cuts.max_dz, PreselectionCuts::default().max_dz);
    }
}

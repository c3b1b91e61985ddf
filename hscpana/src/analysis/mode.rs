use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Analysis mode, numbered like the historical `TypeMode` codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// 0: inner track only, no muon association
    TrackerOnly,
    /// 1: inner track with a tracker or global muon
    TrackerWithMuonId,
    /// 2: inner track plus muon system time-of-flight
    TrackerMuonTiming,
    /// 3: standalone muon track and time-of-flight only
    TofOnly,
    /// 4: global muon, time-of-flight, calorimeter deposits, no cluster cleaning
    CalorimeterAssisted,
    /// 5: maximum ionization bound and explicit cosmic sidebands
    MultiplyCharged,
}

/// Muon association a mode demands from a candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuonRequirement {
    None,
    TrackerOrGlobal,
    Global,
    Standalone,
}

impl AnalysisMode {
    pub fn code(&self) -> u8 {
        match self {
            AnalysisMode::TrackerOnly => 0,
            AnalysisMode::TrackerWithMuonId => 1,
            AnalysisMode::TrackerMuonTiming => 2,
            AnalysisMode::TofOnly => 3,
            AnalysisMode::CalorimeterAssisted => 4,
            AnalysisMode::MultiplyCharged => 5,
        }
    }

    pub fn required_muon(&self) -> MuonRequirement {
        match self {
            AnalysisMode::TrackerOnly | AnalysisMode::MultiplyCharged => MuonRequirement::None,
            AnalysisMode::TrackerWithMuonId => MuonRequirement::TrackerOrGlobal,
            AnalysisMode::TrackerMuonTiming | AnalysisMode::CalorimeterAssisted => MuonRequirement::Global,
            AnalysisMode::TofOnly => MuonRequirement::Standalone,
        }
    }

    /// The candidate track is the standalone muon track, not the inner track.
    #[inline]
    pub fn requires_standalone_track(&self) -> bool {
        matches!(self, AnalysisMode::TofOnly)
    }

    #[inline]
    pub fn uses_muon_timing(&self) -> bool {
        matches!(
            self,
            AnalysisMode::TrackerMuonTiming | AnalysisMode::TofOnly | AnalysisMode::CalorimeterAssisted
        )
    }

    /// A muon station minimum applies when timing is the primary handle.
    #[inline]
    pub fn requires_muon_stations(&self) -> bool {
        matches!(self, AnalysisMode::TofOnly)
    }

    #[inline]
    pub fn uses_tracker_hit_pattern(&self) -> bool {
        !matches!(self, AnalysisMode::TofOnly)
    }

    #[inline]
    pub fn uses_ionization(&self) -> bool {
        !matches!(self, AnalysisMode::TofOnly)
    }

    #[inline]
    pub fn uses_isolation(&self) -> bool {
        !matches!(self, AnalysisMode::TofOnly)
    }

    /// Ionization is bounded from above instead of from below.
    #[inline]
    pub fn inverts_ionization_bound(&self) -> bool {
        matches!(self, AnalysisMode::MultiplyCharged)
    }

    #[inline]
    pub fn models_cosmics(&self) -> bool {
        matches!(self, AnalysisMode::MultiplyCharged)
    }

    /// TOF-only cosmic checks: timing veto, segment separation, noisy sector.
    #[inline]
    pub fn vetoes_cosmic_muons(&self) -> bool {
        matches!(self, AnalysisMode::TofOnly)
    }

    #[inline]
    pub fn uses_cluster_cleaning(&self) -> bool {
        !matches!(self, AnalysisMode::CalorimeterAssisted)
    }

    #[inline]
    pub fn reverse_probability(&self) -> bool {
        matches!(self, AnalysisMode::MultiplyCharged)
    }
}

impl TryFrom<u8> for AnalysisMode {
    type Error = AnalysisError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AnalysisMode::TrackerOnly),
            1 => Ok(AnalysisMode::TrackerWithMuonId),
            2 => Ok(AnalysisMode::TrackerMuonTiming),
            3 => Ok(AnalysisMode::TofOnly),
            4 => Ok(AnalysisMode::CalorimeterAssisted),
            5 => Ok(AnalysisMode::MultiplyCharged),
            other => Err(AnalysisError::Config(format!("unknown analysis mode {}", other))),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=5u8 {
            let mode = AnalysisMode::try_from(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert!(AnalysisMode::try_from(6).is_err());
    }

    #[test]
    fn test_timing_modes() {
        let timing: Vec<u8> = (0..=5u8)
            .filter(|&c| AnalysisMode::try_from(c).unwrap().uses_muon_timing())
            .collect();
        assert_eq!(timing, vec![2, 3, 4]);
    }

    #[test]
    fn test_tof_only_skips_tracker() {
        let m = AnalysisMode::TofOnly;
        assert!(!m.uses_tracker_hit_pattern());
        assert!(!m.uses_ionization());
        assert!(m.requires_standalone_track());
        assert_eq!(m.required_muon(), MuonRequirement::Standalone);
    }

    #[test]
    fn test_mode_serde_names() {
        let m: AnalysisMode = serde_json::from_str("\"multiply_charged\"").unwrap();
        assert_eq!(m, AnalysisMode::MultiplyCharged);
        assert!(m.inverts_ionization_bound() && m.models_cosmics());
    }
}

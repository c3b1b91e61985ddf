//! Systematic variations of signal candidates.
//!
//! Each variation shifts one input, re-runs the preselection without
//! monitoring, recomputes the mass and scans the nominal cut grid, recording
//! passes into the event's [`EvaluationAccumulator`].

use log::trace;
use serde::{Deserialize, Serialize};

use hscpcore::physics::mass::{combined_mass, mass_from_ionization, mass_from_tof, mass_uncertainty, BetheBlochParams};

use crate::analysis::accumulator::{EvaluationAccumulator, Variation};
use crate::analysis::estimators::TrackEstimators;
use crate::analysis::mode::AnalysisMode;
use crate::analysis::preselection::{CandidateInput, Preselection, PreselectionOptions, Rescale};
use crate::analysis::selection::{CutGrid, Region, SelectionInput};
use crate::event::candidate::Track;
use crate::event::record::EventRecord;

// momentum scale parametrization of the inner track curvature bias
const PT_BIAS_CONST: f64 = 0.000236;
const PT_BIAS_ETA2: f64 = -0.000135;
const PT_BIAS_CHARGE: f64 = 0.000282;
const PT_BIAS_PHASE: f64 = 1.337;
// relative momentum scale of standalone muon tracks
const STANDALONE_PT_SCALE: f64 = 1.1;

/// rescaled transverse momentum used by the momentum scale variation
///
/// Arguments:
///
/// * `mode` - analysis mode, the TOF-only mode uses a flat standalone scale
/// * `track` - the candidate track
///
/// Returns:
///
/// * `f64` - the shifted pT in GeV
pub fn rescaled_pt(mode: AnalysisMode, track: &Track) -> f64 {
    let pt = track.pt();
    if mode == AnalysisMode::TofOnly {
        return 1.0 / ((1.0 / pt) * STANDALONE_PT_SCALE);
    }
    let eta = track.eta();
    let curvature = 1.0 / pt
        + PT_BIAS_CONST
        + PT_BIAS_ETA2 * eta * eta
        + track.charge as f64 * PT_BIAS_CHARGE * (track.phi() - PT_BIAS_PHASE).sin();
    1.0 / curvature
}

/// Size of each systematic shift
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystematicShifts {
    // added to Is
    pub ionization: f64,
    // multiplies Ih before the mass conversion
    pub mass_scale: f64,
    // added to 1/beta
    pub tof: f64,
}

impl Default for SystematicShifts {
    fn default() -> Self {
        SystematicShifts {
            ionization: -0.05,
            mass_scale: 0.95,
            tof: -0.015,
        }
    }
}

/// mass hypothesis of a candidate in one analysis mode
///
/// Ionization based everywhere except the TOF-only mode, which uses 1/beta.
pub fn primary_mass(
    mode: AnalysisMode,
    p: f64,
    ih: Option<f64>,
    inverse_beta: Option<f64>,
    params: &BetheBlochParams,
) -> Option<f64> {
    if mode == AnalysisMode::TofOnly {
        inverse_beta.and_then(|ib| mass_from_tof(p, ib))
    } else {
        ih.and_then(|ih| mass_from_ionization(p, ih, params))
    }
}

/// Mass hypotheses of one candidate
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMasses {
    pub ionization: Option<f64>,
    pub ionization_up: Option<f64>,
    pub ionization_down: Option<f64>,
    pub tof: Option<f64>,
    pub combined: Option<f64>,
    // relative uncertainty of the ionization mass
    pub error: Option<f64>,
}

impl CandidateMasses {
    pub fn compute(
        track: &Track,
        estimators: Option<&TrackEstimators>,
        inverse_beta: Option<f64>,
        params: &BetheBlochParams,
    ) -> Self {
        let p = track.p();
        let from_ih = |m: Option<f64>| m.and_then(|ih| mass_from_ionization(p, ih, params));
        let ih = estimators.and_then(|e| e.ih);
        let ionization = from_ih(ih.map(|m| m.value));
        let error = match (ih, ionization) {
            (Some(m), Some(mass)) => mass_uncertainty(p, track.pt_error, m.value, m.error, mass, params),
            _ => None,
        };

        CandidateMasses {
            ionization,
            ionization_up: from_ih(estimators.and_then(|e| e.ih_up).map(|m| m.value)),
            ionization_down: from_ih(estimators.and_then(|e| e.ih_down).map(|m| m.value)),
            tof: inverse_beta.and_then(|ib| mass_from_tof(p, ib)),
            combined: combined_mass(p, ih.map(|m| m.value), inverse_beta, params),
            error,
        }
    }

    /// Masses with 1/beta mirrored around 1, for the fast control region.
    pub fn mirrored(
        track: &Track,
        estimators: Option<&TrackEstimators>,
        inverse_beta: Option<f64>,
        params: &BetheBlochParams,
    ) -> Self {
        Self::compute(track, estimators, inverse_beta.map(|ib| 2.0 - ib), params)
    }

    /// The mass the accumulator tracks in this mode.
    pub fn primary(&self, mode: AnalysisMode) -> Option<f64> {
        if mode == AnalysisMode::TofOnly {
            self.tof
        } else {
            self.ionization
        }
    }
}

/// Per candidate inputs of the variations
#[derive(Clone, Copy)]
pub struct SystematicsInput<'a> {
    pub event: &'a EventRecord,
    pub candidate: CandidateInput<'a>,
    pub track: &'a Track,
    pub is: Option<f64>,
    pub ih: Option<f64>,
    pub inverse_beta: Option<f64>,
    pub weight: f64,
}

/// Runs every variation of one candidate against the nominal grid.
pub struct SystematicsEngine<'a> {
    pub preselection: &'a Preselection,
    pub grid: &'a CutGrid,
    pub params: BetheBlochParams,
    pub shifts: &'a SystematicShifts,
}

impl SystematicsEngine<'_> {
    fn preselect(&self, input: &SystematicsInput<'_>, rescale: Rescale) -> bool {
        let options = PreselectionOptions::default()
            .with_rescale(rescale)
            .with_weight(input.weight);
        self.preselection.passes(input.event, &input.candidate, &options)
    }

    fn scan(
        &self,
        acc: &mut EvaluationAccumulator,
        variation: Variation,
        input: &SystematicsInput<'_>,
        rescale: &Rescale,
        mass: Option<f64>,
    ) {
        let mode = self.preselection.mode;
        let obs = SelectionInput::from_track(mode, input.track, input.is, input.inverse_beta, rescale);
        for index in self.grid.passing(mode, Region::Nominal, &obs, rescale) {
            acc.record(variation, index, mass);
        }
    }

    /// evaluate every systematic variation of one signal candidate
    ///
    /// Arguments:
    ///
    /// * `input` - candidate, its track and measured observables
    /// * `acc` - the event accumulator the passes are recorded into
    pub fn run(&self, input: &SystematicsInput<'_>, acc: &mut EvaluationAccumulator) {
        let mode = self.preselection.mode;
        let track = input.track;
        let p = track.p();
        let params = &self.params;
        let nominal = Rescale::default();
        let nominal_mass = primary_mass(mode, p, input.ih, input.inverse_beta, params);

        // Momentum scale
        let rescale = Rescale::momentum();
        if self.preselect(input, rescale) {
            let p_shifted = p * rescaled_pt(mode, track) / track.pt();
            let mass = primary_mass(mode, p_shifted, input.ih, input.inverse_beta, params);
            self.scan(acc, Variation::MomentumScale, input, &rescale, mass);
        }

        // Ionization scale
        let rescale = Rescale::ionization(self.shifts.ionization);
        if self.preselect(input, rescale) {
            self.scan(acc, Variation::IonizationScale, input, &rescale, nominal_mass);
        }

        // Time-of-flight scale
        let rescale = Rescale::tof(self.shifts.tof);
        if self.preselect(input, rescale) {
            let shifted = input.inverse_beta.map(|ib| ib + self.shifts.tof);
            let mass = primary_mass(mode, p, input.ih, shifted, params);
            self.scan(acc, Variation::TofScale, input, &rescale, mass);
        }

        // Mass scale and pileup keep the nominal preselection
        if !self.preselect(input, nominal) {
            trace!("event {}: nominal preselection failed in systematics", input.event.event);
            return;
        }
        let scaled_ih = input.ih.map(|ih| ih * self.shifts.mass_scale);
        let mass = primary_mass(mode, p, scaled_ih, input.inverse_beta, params);
        self.scan(acc, Variation::MassScale, input, &nominal, mass);
        self.scan(acc, Variation::Pileup, input, &nominal, nominal_mass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cuts::PreselectionCuts;
    use crate::event::fixtures::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rescaled_pt() {
        let t = good_track(100.0, 1.0, 1.337);
        // sin term vanishes
        let expected = 1.0 / (0.01 + 0.000236 - 0.000135);
        assert_relative_eq!(rescaled_pt(AnalysisMode::TrackerOnly, &t), expected, epsilon = 1e-9);
        assert_relative_eq!(rescaled_pt(AnalysisMode::TofOnly, &t), 100.0 / 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_primary_mass_per_mode() {
        let params = BetheBlochParams::new(2.0, 3.0);
        let m = primary_mass(AnalysisMode::TrackerOnly, 100.0, Some(5.0), Some(2.0), &params).unwrap();
        assert_relative_eq!(m, 100.0, epsilon = 1e-9);
        let m = primary_mass(AnalysisMode::TofOnly, 100.0, Some(5.0), Some(2.0), &params).unwrap();
        assert_relative_eq!(m, 100.0 * 3f64.sqrt(), epsilon = 1e-9);
        assert!(primary_mass(AnalysisMode::TofOnly, 100.0, Some(5.0), None, &params).is_none());
    }

    #[test]
    fn test_candidate_masses() {
        let params = BetheBlochParams::new(2.0, 3.0);
        let track = good_track(100.0, 0.0, 0.0);
        let est = estimators(0.3, 5.0);
        let masses = CandidateMasses::compute(&track, Some(&est), Some(1.25), &params);
        assert_relative_eq!(masses.ionization.unwrap(), 100.0, epsilon = 1e-9);
        assert!(masses.ionization_up.unwrap() > masses.ionization.unwrap());
        assert!(masses.ionization_down.unwrap() < masses.ionization.unwrap());
        assert_relative_eq!(masses.tof.unwrap(), 75.0, epsilon = 1e-9);
        assert!(masses.error.unwrap() > 0.0);
        assert_eq!(masses.primary(AnalysisMode::TrackerMuonTiming), masses.ionization);
        assert_eq!(masses.primary(AnalysisMode::TofOnly), masses.tof);

        // 1/beta = 0.75 mirrors to 1.25
        let mirrored = CandidateMasses::mirrored(&track, Some(&est), Some(0.75), &params);
        assert_relative_eq!(mirrored.tof.unwrap(), 75.0, epsilon = 1e-9);
        assert!(CandidateMasses::compute(&track, None, None, &params) == CandidateMasses::default());
    }

    fn engine_run(mode: AnalysisMode, event: &EventRecord, is: f64, ih: f64, inverse_beta: Option<f64>) -> EvaluationAccumulator {
        let cuts = PreselectionCuts::default();
        let preselection = Preselection::new(mode, cuts.clone());
        let grid = CutGrid::for_mode(mode, &cuts);
        let shifts = SystematicShifts::default();
        let engine = SystematicsEngine {
            preselection: &preselection,
            grid: &grid,
            params: BetheBlochParams::default(),
            shifts: &shifts,
        };
        let est = estimators(is, ih);
        let candidate = &event.candidates[0];
        let input = SystematicsInput {
            event,
            candidate: CandidateInput { candidate, estimators: Some(&est), open_angle: -0.1 },
            track: preselection.resolve_track(candidate).unwrap(),
            is: Some(is),
            ih: Some(ih),
            inverse_beta,
            weight: 1.0,
        };
        let mut acc = EvaluationAccumulator::new(grid.nominal.len());
        engine.run(&input, &mut acc);
        acc
    }

    #[test]
    fn test_variations_of_a_clear_signal() {
        let event = event_with(vec![tracker_candidate(good_track(120.0, 0.5, 0.3))]);
        let acc = engine_run(AnalysisMode::TrackerOnly, &event, 0.35, 4.2, None);

        for v in [Variation::MomentumScale, Variation::IonizationScale, Variation::MassScale, Variation::TofScale, Variation::Pileup] {
            assert!(acc.passed(v, 0), "{} did not pass index 0", v);
        }
        // filled in the nominal loop, not here
        assert!(!acc.any_passed(Variation::Nominal));
        assert!(!acc.any_passed(Variation::IonizationUp));

        let nominal = acc.max_mass(Variation::Pileup, 0).unwrap();
        assert!(acc.max_mass(Variation::MassScale, 0).unwrap() < nominal);
        assert_relative_eq!(acc.max_mass(Variation::IonizationScale, 0).unwrap(), nominal, epsilon = 1e-12);
        // the ionization shift removes the tightest Is points
        let count = |v| acc.passing(v).count();
        assert!(count(Variation::IonizationScale) < count(Variation::Pileup));
    }

    #[test]
    fn test_failing_nominal_preselection_records_nothing_nominal() {
        let mut event = event_with(vec![tracker_candidate(good_track(120.0, 0.5, 0.3))]);
        track_mut(&mut event).quality.chi2 = 100.0;
        let acc = engine_run(AnalysisMode::TrackerOnly, &event, 0.35, 4.2, None);
        for v in Variation::ALL {
            assert!(!acc.any_passed(v));
        }
    }

    #[test]
    fn test_tof_shift_in_tof_only_mode() {
        let sa = good_track(150.0, 0.5, 0.3);
        let mut event = event_with(vec![standalone_candidate(sa.clone(), 10.0)]);
        event.refitted_standalone.push(sa);
        let acc = engine_run(AnalysisMode::TofOnly, &event, 0.0, 0.0, Some(1.2));
        let nominal = acc.max_mass(Variation::Pileup, 0).unwrap();
        let shifted = acc.max_mass(Variation::TofScale, 0).unwrap();
        assert!(shifted < nominal);
        // the standalone momentum scale lowers pT by 10 percent
        assert_relative_eq!(acc.max_mass(Variation::MomentumScale, 0).unwrap(), nominal / 1.1, epsilon = 1e-9);
    }
}

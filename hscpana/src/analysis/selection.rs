//! Cut grids and the per cut point selection.
//!
//! Every analysis mode scans a grid of (pT, I, TOF) thresholds. Index 0
//! of both the nominal and the flipped grid is the loosest point, the
//! preselection minimum. The flipped grid inverts the TOF requirement to
//! populate a control region of fast candidates (1/beta below the cut).

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::analysis::cuts::PreselectionCuts;
use crate::analysis::mode::AnalysisMode;
use crate::analysis::preselection::Rescale;
use crate::analysis::systematics::rescaled_pt;
use crate::event::candidate::Track;

/// One point of the cut grid, `None` components are not applied
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutPoint {
    pub pt: Option<f64>,
    pub ionization: Option<f64>,
    pub tof: Option<f64>,
}

impl CutPoint {
    pub fn new(pt: Option<f64>, ionization: Option<f64>, tof: Option<f64>) -> Self {
        CutPoint { pt, ionization, tof }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Nominal,
    // 1/beta required below the TOF cut
    Flip,
}

/// Observables compared against a cut point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionInput {
    pub pt: f64,
    pub is: Option<f64>,
    pub inverse_beta: Option<f64>,
}

impl SelectionInput {
    /// Take pT from the track, rescaled when the momentum shift is active.
    pub fn from_track(mode: AnalysisMode, track: &Track, is: Option<f64>, inverse_beta: Option<f64>, rescale: &Rescale) -> Self {
        let pt = if rescale.momentum { rescaled_pt(mode, track) } else { track.pt() };
        SelectionInput { pt, is, inverse_beta }
    }
}

/// whether a candidate passes one cut point
///
/// Arguments:
///
/// * `mode` - analysis mode, decides which components are compared
/// * `point` - the cut point
/// * `region` - nominal or flipped TOF requirement
/// * `input` - candidate observables
/// * `rescale` - additive Is and 1/beta shifts
///
/// Returns:
///
/// * `bool` - true if every applied component passes; an absent observable fails an applied component
#[inline]
pub fn pass_selection(mode: AnalysisMode, point: &CutPoint, region: Region, input: &SelectionInput, rescale: &Rescale) -> bool {
    // Momentum check
    if let Some(cut) = point.pt {
        if input.pt < cut {
            return false;
        }
    }

    // Ionization check
    if mode != AnalysisMode::TofOnly {
        if let Some(cut) = point.ionization {
            match input.is {
                Some(is) if is + rescale.ionization >= cut => {}
                _ => return false,
            }
        }
    }

    // Time-of-flight check
    if mode.uses_muon_timing() {
        if let Some(cut) = point.tof {
            let inverse_beta = match input.inverse_beta {
                Some(v) => v + rescale.tof,
                None => return false,
            };
            let fails = match region {
                Region::Nominal => inverse_beta < cut,
                Region::Flip => inverse_beta > cut,
            };
            if fails {
                return false;
            }
        }
    }

    true
}

// accumulate like a counting loop, so the grid edges match the historical ones
fn float_steps(start: f64, step: f64, in_range: impl Fn(f64) -> bool) -> Vec<f64> {
    let mut values = Vec::new();
    let mut x = start;
    while in_range(x) {
        values.push(x);
        x += step;
    }
    values
}

/// Nominal and flipped cut grids of one mode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutGrid {
    pub nominal: Vec<CutPoint>,
    pub flip: Vec<CutPoint>,
}

impl CutGrid {
    /// build the grids of one analysis mode
    ///
    /// Arguments:
    ///
    /// * `mode` - analysis mode
    /// * `cuts` - preselection table, its minimum pT, Is and TOF form index 0
    ///
    /// Returns:
    ///
    /// * `CutGrid` - nominal and flipped grids
    pub fn for_mode(mode: AnalysisMode, cuts: &PreselectionCuts) -> Self {
        let (min_pt, min_is, min_tof) = (cuts.min_pt, cuts.min_is, cuts.min_tof);
        let loosest = CutPoint::new(Some(min_pt), Some(min_is), Some(min_tof));
        let mut nominal = vec![loosest];
        let mut flip = vec![loosest];

        match mode {
            AnalysisMode::TrackerOnly | AnalysisMode::TrackerWithMuonId => {
                let pts = float_steps(min_pt + 5.0, 5.0, |x| x < 200.0);
                let is = float_steps(min_is + 0.025, 0.025, |x| x < 0.45);
                nominal.extend(iproduct!(pts, is).map(|(pt, i)| CutPoint::new(Some(pt), Some(i), None)));
            }
            AnalysisMode::TrackerMuonTiming => {
                // above 80 GeV only every 10 GeV
                let pts: Vec<f64> = float_steps(min_pt + 5.0, 5.0, |x| x < 120.0)
                    .into_iter()
                    .filter(|&pt| pt <= 80.0 || (pt as i64) % 10 == 0)
                    .collect();
                let is = float_steps(min_is + 0.025, 0.025, |x| x < 0.40);
                let tofs = float_steps(min_tof + 0.025, 0.025, |x| x < 1.35);
                nominal.extend(
                    iproduct!(pts, is, tofs).map(|(pt, i, t)| CutPoint::new(Some(pt), Some(i), Some(t))),
                );

                let pts = float_steps(min_pt + 10.0, 30.0, |x| x < 90.0);
                let is = float_steps(min_is + 0.1, 0.1, |x| x < 0.30);
                let tofs = float_steps(min_tof - 0.05, -0.05, |x| x > 0.65);
                flip.extend(iproduct!(pts, is, tofs).map(|(pt, i, t)| CutPoint::new(Some(pt), Some(i), Some(t))));
            }
            AnalysisMode::TofOnly => {
                let pts = float_steps(min_pt + 30.0, 30.0, |x| x < 450.0);
                let tofs = float_steps(min_tof + 0.025, 0.025, |x| x < 1.5);
                nominal.extend(iproduct!(pts, tofs).map(|(pt, t)| CutPoint::new(Some(pt), None, Some(t))));

                let pts = float_steps(min_pt + 30.0, 60.0, |x| x < 450.0);
                let tofs = float_steps(min_tof - 0.025, -0.025, |x| x > 0.5);
                flip.extend(iproduct!(pts, tofs).map(|(pt, t)| CutPoint::new(Some(pt), None, Some(t))));
            }
            AnalysisMode::CalorimeterAssisted => {
                let is = float_steps(min_is + 0.025, 0.025, |x| x < 0.55);
                let tofs = float_steps(min_tof + 0.025, 0.025, |x| x < 1.46);
                nominal.extend(iproduct!(is.iter().copied(), tofs).map(|(i, t)| CutPoint::new(None, Some(i), Some(t))));

                let tofs = float_steps(min_tof - 0.025, -0.025, |x| x > 0.54);
                flip.extend(iproduct!(is, tofs).map(|(i, t)| CutPoint::new(None, Some(i), Some(t))));
            }
            AnalysisMode::MultiplyCharged => {
                let pts = float_steps(75.0, 25.0, |x| x <= 150.0);
                let is = float_steps(0.0, 0.025, |x| x <= 0.45);
                nominal.extend(iproduct!(pts, is).map(|(pt, i)| CutPoint::new(Some(pt), Some(i), None)));
                flip = nominal.clone();
            }
        }

        CutGrid { nominal, flip }
    }

    pub fn points(&self, region: Region) -> &[CutPoint] {
        match region {
            Region::Nominal => &self.nominal,
            Region::Flip => &self.flip,
        }
    }

    pub fn len(&self, region: Region) -> usize {
        self.points(region).len()
    }

    /// Indices of the cut points a candidate passes.
    pub fn passing<'a>(
        &'a self,
        mode: AnalysisMode,
        region: Region,
        input: &'a SelectionInput,
        rescale: &'a Rescale,
    ) -> impl Iterator<Item = usize> + 'a {
        self.points(region)
            .iter()
            .enumerate()
            .filter(move |(_, p)| pass_selection(mode, p, region, input, rescale))
            .map(|(i, _)| i)
    }
}

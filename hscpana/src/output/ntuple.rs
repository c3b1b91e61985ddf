use serde::{Deserialize, Serialize};

use crate::analysis::estimators::TrackEstimators;
use crate::analysis::preselection::{Gate, PreselectionOutcome};
use crate::analysis::systematics::CandidateMasses;
use crate::event::candidate::{HscpCandidate, MuonTime, Track};

/// Flattened time-of-flight fit
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TofTriple {
    pub inverse_beta: f64,
    pub inverse_beta_err: f64,
    pub ndof: u32,
}

impl From<&MuonTime> for TofTriple {
    fn from(t: &MuonTime) -> Self {
        TofTriple {
            inverse_beta: t.inverse_beta,
            inverse_beta_err: t.inverse_beta_err,
            ndof: t.ndof,
        }
    }
}

/// One candidate of one event, flat
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub index: usize,
    pub pt: f64,
    pub pt_err: f64,
    pub eta: f64,
    pub phi: f64,
    pub charge: i32,

    // discriminants
    pub ias: Option<f64>,
    pub ias_no_inner_strips: Option<f64>,
    pub ias_pixel_only: Option<f64>,
    pub prob_q_dedx: Option<f64>,

    // harmonic estimators
    pub ih: Option<f64>,
    pub ih_err: Option<f64>,
    pub ih_up: Option<f64>,
    pub ih_down: Option<f64>,
    pub ih_no_l1: Option<f64>,
    pub ih_15drop: Option<f64>,
    pub ih_strip_only: Option<f64>,
    pub ih_strip_only_15drop: Option<f64>,
    pub ih_saturation_from_fits: Option<f64>,
    pub n_dedx_measurements: usize,
    // (Ih - C) / K
    pub ick: Option<f64>,
    pub fmip: Option<f64>,

    pub prob_q: Option<f64>,
    pub prob_xy: Option<f64>,
    pub prob_q_no_l1: Option<f64>,
    pub prob_xy_no_l1: Option<f64>,

    pub tof: Option<TofTriple>,
    pub tof_dt: Option<TofTriple>,
    pub tof_csc: Option<TofTriple>,

    pub mass: Option<f64>,
    pub mass_tof: Option<f64>,
    pub mass_comb: Option<f64>,
    pub mass_err: Option<f64>,

    pub dz: Option<f64>,
    pub dxy: Option<f64>,
    pub n_hits: u32,
    pub n_pixel_hits: u32,
    pub valid_fraction: f64,
    pub chi2_per_ndof: f64,
    pub tk_isolation: Option<f64>,
    pub calo_isolation: Option<f64>,
    pub open_angle: f64,

    pub pass_preselection: bool,
    pub pass_preselection_no_ih_no_iso: bool,
    pub failed_at: Option<Gate>,
    pub is_cosmic: bool,
    pub is_semi_cosmic: bool,
    pub gen_beta: Option<f64>,
}

/// Inputs of a row besides the candidate itself
pub struct RowContext<'a> {
    pub index: usize,
    pub track: &'a Track,
    pub estimators: Option<&'a TrackEstimators>,
    pub masses: &'a CandidateMasses,
    pub outcome: &'a PreselectionOutcome,
    pub reduced_pass: bool,
    pub open_angle: f64,
    pub ick: Option<f64>,
}

impl CandidateRow {
    pub fn new(candidate: &HscpCandidate, ctx: &RowContext<'_>) -> Self {
        let track = ctx.track;
        let value = |f: fn(&TrackEstimators) -> Option<f64>| ctx.estimators.and_then(f);
        let pixel = ctx.outcome.pixel;

        CandidateRow {
            index: ctx.index,
            pt: track.pt(),
            pt_err: track.pt_error,
            eta: track.eta(),
            phi: track.phi(),
            charge: track.charge,

            ias: value(|e| e.ias.map(|m| m.value)),
            ias_no_inner_strips: value(|e| e.ias_no_inner_strips.map(|m| m.value)),
            ias_pixel_only: value(|e| e.ias_pixel_only.map(|m| m.value)),
            prob_q_dedx: value(|e| e.prob_q_dedx.map(|m| m.value)),

            ih: value(|e| e.ih.map(|m| m.value)),
            ih_err: value(|e| e.ih.map(|m| m.error)),
            ih_up: value(|e| e.ih_up.map(|m| m.value)),
            ih_down: value(|e| e.ih_down.map(|m| m.value)),
            ih_no_l1: value(|e| e.ih_no_l1.map(|m| m.value)),
            ih_15drop: value(|e| e.ih_15drop.map(|m| m.value)),
            ih_strip_only: value(|e| e.ih_strip_only.map(|m| m.value)),
            ih_strip_only_15drop: value(|e| e.ih_strip_only_15drop.map(|m| m.value)),
            ih_saturation_from_fits: value(|e| e.ih_saturation_from_fits.map(|m| m.value)),
            n_dedx_measurements: ctx.estimators.and_then(|e| e.ih).map_or(0, |m| m.n_measurements),
            ick: ctx.ick,
            fmip: value(|e| e.fmip),

            prob_q: pixel.and_then(|p| p.prob_q()),
            prob_xy: pixel.map(|p| p.prob_xy),
            prob_q_no_l1: pixel.and_then(|p| p.prob_q_no_l1()),
            prob_xy_no_l1: pixel.map(|p| p.prob_xy_no_l1),

            tof: candidate.tof.as_ref().map(|t| TofTriple::from(&t.combined)),
            tof_dt: candidate.tof.as_ref().map(|t| TofTriple::from(&t.dt)),
            tof_csc: candidate.tof.as_ref().map(|t| TofTriple::from(&t.csc)),

            mass: ctx.masses.ionization,
            mass_tof: ctx.masses.tof,
            mass_comb: ctx.masses.combined,
            mass_err: ctx.masses.error,

            dz: ctx.outcome.dz,
            dxy: ctx.outcome.dxy,
            n_hits: track.quality.found,
            n_pixel_hits: track.quality.valid_pixel_hits,
            valid_fraction: track.quality.valid_fraction,
            chi2_per_ndof: track.quality.chi2_per_ndof(),
            tk_isolation: candidate.isolation.map(|i| i.tk_sum_et),
            calo_isolation: candidate.isolation.map(|i| (i.ecal_energy + i.hcal_energy) / track.p()),
            open_angle: ctx.open_angle,

            pass_preselection: ctx.outcome.passed,
            pass_preselection_no_ih_no_iso: ctx.reduced_pass,
            failed_at: ctx.outcome.failed_at,
            is_cosmic: ctx.outcome.cosmic.is_cosmic(),
            is_semi_cosmic: ctx.outcome.cosmic.is_semi_cosmic(),
            gen_beta: candidate.gen.map(|g| g.beta),
        }
    }
}

/// One event with its candidate rows
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub run: u32,
    pub lumi: u32,
    pub event: u64,
    pub trigger: u8,
    pub n_vertices: usize,
    pub n_candidates: usize,
    pub weight: f64,
    pub candidates: Vec<CandidateRow>,
}

//! Ordered preselection gates for one candidate.
//!
//! Gates run in a fixed order and the first failing gate ends the
//! evaluation. Monitoring is optional: with no monitor attached the gates
//! run identically and leave no trace besides the returned outcome.

use std::fmt;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use hscpcore::dedx::probability::PixelProbabilities;

use crate::analysis::cuts::PreselectionCuts;
use crate::analysis::estimators::TrackEstimators;
use crate::analysis::mode::{AnalysisMode, MuonRequirement};
use crate::analysis::systematics::rescaled_pt;
use crate::event::candidate::{CandidateType, HscpCandidate, Track};
use crate::event::record::EventRecord;

// in-out times of cosmic muons cluster around these values (ns)
const COSMIC_TIMES: [f64; 4] = [50.0, 100.0, -50.0, -100.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    CandidateType,
    Eta,
    MuonStations,
    Vertex,
    HitPattern,
    DeDxMeasurements,
    PixelProbability,
    TofNdof,
    HighPurity,
    Chi2,
    Pt,
    Ionization,
    TofError,
    CosmicTiming,
    ImpactParameter3D,
    Dxy,
    Isolation,
    PtError,
    Dz,
    SegmentSeparation,
}

impl Gate {
    pub const COUNT: usize = 20;

    /// Gates in evaluation order
    pub const ALL: [Gate; Gate::COUNT] = [
        Gate::CandidateType,
        Gate::Eta,
        Gate::MuonStations,
        Gate::Vertex,
        Gate::HitPattern,
        Gate::DeDxMeasurements,
        Gate::PixelProbability,
        Gate::TofNdof,
        Gate::HighPurity,
        Gate::Chi2,
        Gate::Pt,
        Gate::Ionization,
        Gate::TofError,
        Gate::CosmicTiming,
        Gate::ImpactParameter3D,
        Gate::Dxy,
        Gate::Isolation,
        Gate::PtError,
        Gate::Dz,
        Gate::SegmentSeparation,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Histogram stem used by monitors
    pub fn name(&self) -> &'static str {
        match self {
            Gate::CandidateType => "Type",
            Gate::Eta => "Eta",
            Gate::MuonStations => "Stations",
            Gate::Vertex => "NVertex",
            Gate::HitPattern => "TNOH",
            Gate::DeDxMeasurements => "TNOM",
            Gate::PixelProbability => "ProbQ",
            Gate::TofNdof => "nDof",
            Gate::HighPurity => "Qual",
            Gate::Chi2 => "Chi2PerNdof",
            Gate::Pt => "MPt",
            Gate::Ionization => "MI",
            Gate::TofError => "TOFError",
            Gate::CosmicTiming => "TimeAtIP",
            Gate::ImpactParameter3D => "V3D",
            Gate::Dxy => "Dxy",
            Gate::Isolation => "TIsol",
            Gate::PtError => "Pterr",
            Gate::Dz => "Dz",
            Gate::SegmentSeparation => "SegMinEtaSep",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives gate quantities before a cut is applied and after it passed.
pub trait PreselectionMonitor {
    fn before_cut(&mut self, gate: Gate, value: f64, weight: f64);
    fn after_cut(&mut self, gate: Gate, value: f64, weight: f64);
}

/// Input shifts used to re-evaluate a candidate under systematic variations
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rescale {
    // replace pT by its rescaled value
    pub momentum: bool,
    // added to Is
    pub ionization: f64,
    // added to 1/beta
    pub tof: f64,
}

impl Rescale {
    pub fn momentum() -> Self {
        Rescale { momentum: true, ..Default::default() }
    }

    pub fn ionization(shift: f64) -> Self {
        Rescale { ionization: shift, ..Default::default() }
    }

    pub fn tof(shift: f64) -> Self {
        Rescale { tof: shift, ..Default::default() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreselectionOptions {
    pub rescale: Rescale,
    // false gives the reduced preselection without ionization and isolation gates
    pub with_ionization_and_isolation: bool,
    pub weight: f64,
}

impl Default for PreselectionOptions {
    fn default() -> Self {
        PreselectionOptions {
            rescale: Rescale::default(),
            with_ionization_and_isolation: true,
            weight: 1.0,
        }
    }
}

impl PreselectionOptions {
    pub fn reduced() -> Self {
        PreselectionOptions {
            with_ionization_and_isolation: false,
            ..Default::default()
        }
    }

    pub fn with_rescale(mut self, rescale: Rescale) -> Self {
        self.rescale = rescale;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Per-candidate quantities computed before the gates run.
#[derive(Clone, Copy)]
pub struct CandidateInput<'a> {
    pub candidate: &'a HscpCandidate,
    pub estimators: Option<&'a TrackEstimators>,
    pub open_angle: f64,
}

/// Cosmic ray sideband flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmicFlags {
    pub large_dxy: bool,
    pub large_dz: bool,
    pub wide_angle: bool,
}

impl CosmicFlags {
    /// All three sideband conditions hold.
    pub fn is_cosmic(&self) -> bool {
        self.large_dxy && self.large_dz && self.wide_angle
    }

    /// One or two of the sideband conditions hold.
    pub fn is_semi_cosmic(&self) -> bool {
        !self.is_cosmic() && (self.large_dxy || self.large_dz || self.wide_angle)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreselectionOutcome {
    pub passed: bool,
    pub failed_at: Option<Gate>,
    pub dz: Option<f64>,
    pub dxy: Option<f64>,
    pub cosmic: CosmicFlags,
    pub pixel: Option<PixelProbabilities>,
}

struct Fills<'m> {
    monitor: Option<&'m mut dyn PreselectionMonitor>,
    weight: f64,
}

impl Fills<'_> {
    fn before(&mut self, gate: Gate, value: f64) {
        if let Some(m) = self.monitor.as_deref_mut() {
            m.before_cut(gate, value, self.weight);
        }
    }

    fn after(&mut self, gate: Gate, value: f64) {
        if let Some(m) = self.monitor.as_deref_mut() {
            m.after_cut(gate, value, self.weight);
        }
    }
}

/// The preselection of one analysis mode
#[derive(Clone, Debug)]
pub struct Preselection {
    pub mode: AnalysisMode,
    pub cuts: PreselectionCuts,
    disabled: Vec<Gate>,
}

impl Preselection {
    pub fn new(mode: AnalysisMode, cuts: PreselectionCuts) -> Self {
        Preselection {
            mode,
            cuts,
            disabled: Vec::new(),
        }
    }

    /// Skip one gate entirely, cut and monitoring.
    pub fn with_disabled(mut self, gate: Gate) -> Self {
        if !self.disabled.contains(&gate) {
            self.disabled.push(gate);
        }
        self
    }

    #[inline]
    fn enabled(&self, gate: Gate) -> bool {
        !self.disabled.contains(&gate)
    }

    /// The track the mode evaluates: inner track, or standalone muon track.
    pub fn resolve_track<'c>(&self, candidate: &'c HscpCandidate) -> Option<&'c Track> {
        candidate.resolve_track(self.mode.requires_standalone_track())
    }

    fn type_compatible(&self, candidate: &HscpCandidate) -> bool {
        match self.mode.required_muon() {
            MuonRequirement::None => true,
            MuonRequirement::TrackerOrGlobal => {
                matches!(candidate.kind, CandidateType::TrackerMuon | CandidateType::GlobalMuon)
            }
            MuonRequirement::Global => candidate.kind == CandidateType::GlobalMuon,
            MuonRequirement::Standalone => candidate.muon.as_ref().map_or(false, |m| m.is_standalone),
        }
    }

    /// run the gates on one candidate
    ///
    /// Arguments:
    ///
    /// * `event` - the event the candidate belongs to
    /// * `input` - candidate with its estimators and opening angle
    /// * `options` - rescale hooks, reduced mode and weight
    /// * `monitor` - optional receiver of gate quantities
    ///
    /// Returns:
    ///
    /// * `PreselectionOutcome` - pass flag, failing gate, impact parameters and cosmic flags
    pub fn evaluate(
        &self,
        event: &EventRecord,
        input: &CandidateInput<'_>,
        options: &PreselectionOptions,
        monitor: Option<&mut dyn PreselectionMonitor>,
    ) -> PreselectionOutcome {
        let mut fills = Fills { monitor, weight: options.weight };
        let mut out = PreselectionOutcome {
            pixel: input.estimators.map(|e| e.pixel),
            ..Default::default()
        };

        match self.run_gates(event, input, options, &mut fills, &mut out) {
            Ok(()) => out.passed = true,
            Err(gate) => {
                trace!("event {}: candidate rejected at {}", event.event, gate);
                out.failed_at = Some(gate);
            }
        }

        // monitored whatever gate stopped the candidate
        out.cosmic = CosmicFlags {
            large_dxy: out.dxy.map_or(false, |d| d.abs() > self.cuts.max_dxy),
            large_dz: out.dz.map_or(false, |d| d.abs() > self.cuts.max_dz),
            wide_angle: input.open_angle >= self.cuts.cosmic_open_angle,
        };
        out
    }

    /// Pass flag only, without monitoring.
    pub fn passes(&self, event: &EventRecord, input: &CandidateInput<'_>, options: &PreselectionOptions) -> bool {
        self.evaluate(event, input, options, None).passed
    }

    fn run_gates(
        &self,
        event: &EventRecord,
        input: &CandidateInput<'_>,
        options: &PreselectionOptions,
        fills: &mut Fills<'_>,
        out: &mut PreselectionOutcome,
    ) -> Result<(), Gate> {
        let mode = self.mode;
        let cuts = &self.cuts;
        let cand = input.candidate;
        let hit_pattern = mode.uses_tracker_hit_pattern();
        let timing = mode.uses_muon_timing();
        let ionization = options.with_ionization_and_isolation && mode.uses_ionization();

        // Candidate type check, a candidate without track can never continue
        let track = self.resolve_track(cand).ok_or(Gate::CandidateType)?;
        if self.enabled(Gate::CandidateType) && !self.type_compatible(cand) {
            return Err(Gate::CandidateType);
        }

        let reference = event.reference_vertex(track);
        let position = reference.and_then(|r| event.vertices.get(r.index)).map(|v| v.position);
        let mut dz = position.map(|p| track.dz(&p));
        let mut dxy = position.map(|p| track.dxy(&p));
        out.dz = dz;
        out.dxy = dxy;

        // Eta check
        if self.enabled(Gate::Eta) {
            fills.before(Gate::Eta, track.eta());
            if track.eta().abs() > cuts.max_eta {
                return Err(Gate::Eta);
            }
            fills.after(Gate::Eta, track.eta());
        }

        // Muon station check
        if self.enabled(Gate::MuonStations) {
            let stations = track.quality.muon_stations;
            fills.before(Gate::MuonStations, stations as f64);
            if mode.requires_muon_stations() && stations < cuts.min_muon_stations {
                return Err(Gate::MuonStations);
            }
            fills.after(Gate::MuonStations, stations as f64);
        }

        // Vertex check
        if self.enabled(Gate::Vertex) {
            fills.before(Gate::Vertex, event.vertices.len() as f64);
            if reference.is_none() {
                return Err(Gate::Vertex);
            }
            fills.after(Gate::Vertex, reference.map_or(0, |r| r.n_good) as f64);
        }

        // Hit pattern check
        if self.enabled(Gate::HitPattern) {
            let q = &track.quality;
            fills.before(Gate::HitPattern, q.found as f64);
            if hit_pattern
                && (q.found < cuts.min_hits
                    || q.valid_pixel_hits < cuts.min_pixel_hits
                    || q.valid_fraction < cuts.min_valid_fraction
                    || q.missing_till_last() > cuts.max_missing_till_last
                    || q.valid_fraction_till_last() < cuts.min_valid_fraction_till_last)
            {
                return Err(Gate::HitPattern);
            }
            fills.after(Gate::HitPattern, q.valid_fraction_till_last());
        }

        let is = input.estimators.and_then(|e| e.ias);
        let ih = input.estimators.and_then(|e| e.ih);

        // dE/dx measurement count check
        if self.enabled(Gate::DeDxMeasurements) && ionization {
            let n = is.ok_or(Gate::DeDxMeasurements)?.n_measurements;
            fills.before(Gate::DeDxMeasurements, n as f64);
            if n < cuts.min_dedx_measurements {
                return Err(Gate::DeDxMeasurements);
            }
            fills.after(Gate::DeDxMeasurements, n as f64);
        }

        // Pixel probability check
        if self.enabled(Gate::PixelProbability) && hit_pattern {
            let p = out.pixel.ok_or(Gate::PixelProbability)?;
            if p.is_degenerate() {
                return Err(Gate::PixelProbability);
            }
            fills.before(Gate::PixelProbability, p.prob_q);
            if p.prob_q > cuts.max_track_prob_q || p.prob_q_no_l1 > cuts.max_track_prob_q {
                return Err(Gate::PixelProbability);
            }
            if !(0.0..=1.0).contains(&p.prob_xy) {
                return Err(Gate::PixelProbability);
            }
            fills.after(Gate::PixelProbability, p.prob_q);
        }

        // Time-of-flight quality check
        if self.enabled(Gate::TofNdof) {
            match cand.tof {
                Some(tof) => {
                    fills.before(Gate::TofNdof, tof.combined.ndof as f64);
                    if timing
                        && tof.combined.ndof < cuts.min_tof_ndof
                        && (tof.dt.ndof < cuts.min_tof_ndof_dt || tof.csc.ndof < cuts.min_tof_ndof_csc)
                    {
                        return Err(Gate::TofNdof);
                    }
                    fills.after(Gate::TofNdof, tof.combined.ndof as f64);
                }
                None if timing => return Err(Gate::TofNdof),
                None => {}
            }
        }

        // Track quality check
        if self.enabled(Gate::HighPurity) && hit_pattern && !track.quality.high_purity {
            return Err(Gate::HighPurity);
        }

        // Chi2 check
        if self.enabled(Gate::Chi2) {
            let chi2 = track.quality.chi2_per_ndof();
            fills.before(Gate::Chi2, chi2);
            if hit_pattern && (chi2.is_nan() || chi2 > cuts.max_chi2_per_ndof) {
                return Err(Gate::Chi2);
            }
            fills.after(Gate::Chi2, chi2);
        }

        // Momentum check
        if self.enabled(Gate::Pt) {
            let pt = if options.rescale.momentum { rescaled_pt(mode, track) } else { track.pt() };
            fills.before(Gate::Pt, pt);
            if pt < cuts.min_pt {
                return Err(Gate::Pt);
            }
            fills.after(Gate::Pt, pt);
        }

        // Ionization check
        if self.enabled(Gate::Ionization) && ionization {
            let is = is.ok_or(Gate::Ionization)?.value;
            if is + options.rescale.ionization < cuts.min_is {
                return Err(Gate::Ionization);
            }
            let ih = ih.ok_or(Gate::Ionization)?.value;
            fills.before(Gate::Ionization, ih);
            let outside = if mode.inverts_ionization_bound() { ih > cuts.ih_bound } else { ih < cuts.ih_bound };
            if outside {
                return Err(Gate::Ionization);
            }
            fills.after(Gate::Ionization, ih);
        }

        // Time-of-flight uncertainty check
        if self.enabled(Gate::TofError) {
            match cand.tof {
                Some(tof) => {
                    fills.before(Gate::TofError, tof.combined.inverse_beta_err);
                    if timing && tof.combined.inverse_beta_err > cuts.max_tof_err {
                        return Err(Gate::TofError);
                    }
                    fills.after(Gate::TofError, tof.combined.inverse_beta_err);
                }
                None if timing => return Err(Gate::TofError),
                None => {}
            }
        }

        // Cosmic timing check
        if self.enabled(Gate::CosmicTiming) && mode.vetoes_cosmic_muons() {
            let t = cand.tof.ok_or(Gate::CosmicTiming)?.combined.time_at_ip_in_out;
            fills.before(Gate::CosmicTiming, t);
            let closest = COSMIC_TIMES.iter().map(|c| (t - c).abs()).fold(f64::INFINITY, f64::min);
            if closest < cuts.cosmic_timing_window {
                return Err(Gate::CosmicTiming);
            }
            fills.after(Gate::CosmicTiming, t);
        }

        // Standalone tracks use the refit without vertex constraint and the beam spot
        if mode.vetoes_cosmic_muons() {
            let nearest = event
                .nearest_no_vertex_track(track)
                .filter(|(_, dr)| *dr <= cuts.max_no_vertex_dr);
            match nearest {
                Some((refit, _)) => {
                    dz = Some(refit.dz(&event.beam_spot));
                    dxy = Some(refit.dxy(&event.beam_spot));
                    out.dz = dz;
                    out.dxy = dxy;
                    if self.enabled(Gate::ImpactParameter3D)
                        && refit.quality.muon_stations < cuts.min_muon_stations
                    {
                        return Err(Gate::ImpactParameter3D);
                    }
                }
                None if self.enabled(Gate::ImpactParameter3D) => return Err(Gate::ImpactParameter3D),
                None => {}
            }
        }

        // 3D distance check
        if self.enabled(Gate::ImpactParameter3D) {
            let (z, xy) = dz.zip(dxy).ok_or(Gate::ImpactParameter3D)?;
            let v3d = (z * z + xy * xy).sqrt();
            fills.before(Gate::ImpactParameter3D, v3d);
            if v3d > cuts.max_v3d {
                return Err(Gate::ImpactParameter3D);
            }
            fills.after(Gate::ImpactParameter3D, v3d);
        }

        // Transverse impact parameter check
        if self.enabled(Gate::Dxy) {
            let d = dxy.ok_or(Gate::Dxy)?;
            let limit = if mode.models_cosmics() { cuts.cosmic_window } else { cuts.max_dxy };
            fills.before(Gate::Dxy, d);
            if d.abs() > limit {
                return Err(Gate::Dxy);
            }
            fills.after(Gate::Dxy, d);
        }

        // Isolation check
        if self.enabled(Gate::Isolation) && options.with_ionization_and_isolation && mode.uses_isolation() {
            let iso = cand.isolation.ok_or(Gate::Isolation)?;
            fills.before(Gate::Isolation, iso.tk_sum_et);
            if iso.tk_sum_et > cuts.max_tk_isolation {
                return Err(Gate::Isolation);
            }
            if (iso.ecal_energy + iso.hcal_energy) / track.p() > cuts.max_calo_isolation {
                return Err(Gate::Isolation);
            }
            if iso.tk_sum_et / track.pt() > cuts.max_rel_tk_isolation {
                return Err(Gate::Isolation);
            }
            fills.after(Gate::Isolation, iso.tk_sum_et);
        }

        // Relative momentum uncertainty check
        if self.enabled(Gate::PtError) {
            let rel = track.pt_error / track.pt();
            fills.before(Gate::PtError, rel);
            if hit_pattern && rel > cuts.max_pt_err {
                return Err(Gate::PtError);
            }
            fills.after(Gate::PtError, rel);
        }

        // Longitudinal impact parameter check
        if self.enabled(Gate::Dz) {
            let d = dz.ok_or(Gate::Dz)?;
            let limit = if mode.models_cosmics() { cuts.cosmic_window } else { cuts.max_dz };
            fills.before(Gate::Dz, d);
            if d.abs() > limit {
                return Err(Gate::Dz);
            }
            fills.after(Gate::Dz, d);
        }

        // Segment separation and noisy sector check
        if self.enabled(Gate::SegmentSeparation) && mode.vetoes_cosmic_muons() {
            let sep = event.segment_separation(track);
            fills.before(Gate::SegmentSeparation, sep.min_eta);
            if sep.min_eta.abs() < cuts.min_segment_eta_sep {
                return Err(Gate::SegmentSeparation);
            }
            let abs_phi = track.phi().abs();
            if abs_phi > cuts.noisy_phi_low && abs_phi < cuts.noisy_phi_high {
                return Err(Gate::SegmentSeparation);
            }
            fills.after(Gate::SegmentSeparation, sep.min_eta);
        }
        Ok(())
    }
}

/// Counts of candidates per failing gate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreselectionDiagnostics {
    pub total: usize,
    pub passed: usize,
    pub failed: Vec<usize>,
}

impl PreselectionDiagnostics {
    pub fn new() -> Self {
        PreselectionDiagnostics {
            total: 0,
            passed: 0,
            failed: vec![0; Gate::COUNT],
        }
    }

    pub fn record(&mut self, outcome: &PreselectionOutcome) {
        self.total += 1;
        match outcome.failed_at {
            None => self.passed += 1,
            Some(gate) => self.record_failure(gate),
        }
    }

    pub fn record_failure(&mut self, gate: Gate) {
        if self.failed.len() < Gate::COUNT {
            self.failed.resize(Gate::COUNT, 0);
        }
        self.failed[gate.index()] += 1;
    }

    pub fn failed_at(&self, gate: Gate) -> usize {
        self.failed.get(gate.index()).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let pct = if self.total > 0 {
            (self.passed as f64 / self.total as f64) * 100.0
        } else {
            100.0
        };
        let mut s = format!(
            "PreselectionDiagnostics: {}/{} passed ({:.1}%)\nFailures by gate:\n",
            self.passed, self.total, pct
        );
        for gate in Gate::ALL {
            let n = self.failed_at(gate);
            if n > 0 {
                s.push_str(&format!("  - {}: {}\n", gate, n));
            }
        }
        debug!("{}", s.trim_end());
        s
    }
}

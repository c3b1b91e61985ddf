//! Per event orchestration of the candidate evaluation.
//!
//! The driver classifies the trigger, evaluates every candidate through the
//! estimators, the preselection, the mass reconstruction, the cut grid scan
//! and (for signal) the systematic variations, then fills the histogram book
//! and produces one n-tuple row per event.

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use hscpcore::dedx::calibration::{DeDxTemplates, TrackerGains};
use hscpcore::dedx::estimator::DeDxContext;
use hscpcore::physics::mass::reduced_ionization;

use crate::analysis::accumulator::{EvaluationAccumulator, Variation};
use crate::analysis::estimators::{EstimatorSuite, TrackEstimators};
use crate::analysis::mode::AnalysisMode;
use crate::analysis::preselection::{
    CandidateInput, Gate, Preselection, PreselectionDiagnostics, PreselectionMonitor, PreselectionOptions, Rescale,
};
use crate::analysis::selection::{CutGrid, Region, SelectionInput};
use crate::analysis::systematics::{CandidateMasses, SystematicsEngine, SystematicsInput};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::event::record::EventRecord;
use crate::output::histogram::{Binning, HistogramBook, MASS_BINNING};
use crate::output::io::{load_gains, load_templates};
use crate::output::ntuple::{CandidateRow, EventRow, RowContext};

// acceptance correction of the TOF-only selection in simulation, per eta bin
const TOF_ONLY_ETA_EDGES: [f64; 15] = [
    -2.1, -1.8, -1.5, -1.2, -0.9, -0.6, -0.3, 0.0, 0.3, 0.6, 0.9, 1.2, 1.5, 1.8, 2.1,
];
const TOF_ONLY_ETA_SCALES: [f64; 15] = [
    0.0, 0.97, 1.06, 1.00, 0.89, 0.91, 0.93, 0.93, 0.92, 0.92, 0.91, 0.89, 1.00, 1.06, 0.99,
];

/// Scale factor of the first eta bin whose upper edge lies above `eta`, 0 beyond the table.
pub fn tof_only_eta_scale(eta: f64) -> f64 {
    TOF_ONLY_ETA_EDGES
        .iter()
        .position(|&edge| eta < edge)
        .map_or(0.0, |i| TOF_ONLY_ETA_SCALES[i])
}

/// Trigger class of an event: 0 none, 1 muon, 2 MET, 3 both.
pub fn classify_trigger(fired: &[String], muon: &[Regex], met: &[Regex]) -> u8 {
    let matches = |patterns: &[Regex]| fired.iter().any(|name| patterns.iter().any(|re| re.is_match(name)));
    match (matches(muon), matches(met)) {
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
        (false, false) => 0,
    }
}

fn fill_control(
    book: &mut HistogramBook,
    pt: f64,
    is: Option<f64>,
    ih: Option<f64>,
    inverse_beta: Option<f64>,
    mass: Option<f64>,
    weight: f64,
) {
    book.fill_with("Control_Pt", Binning::new(200, 0.0, 2000.0), pt, weight);
    if let Some(v) = is {
        book.fill_with("Control_Is", Binning::new(100, 0.0, 1.0), v, weight);
    }
    if let Some(v) = ih {
        book.fill_with("Control_Ih", Binning::new(100, 0.0, 15.0), v, weight);
    }
    if let Some(v) = inverse_beta {
        book.fill_with("Control_TOF", Binning::new(100, 0.0, 2.0), v, weight);
    }
    if let Some(m) = mass {
        book.fill_with("Control_Mass", MASS_BINNING, m, weight);
    }
}

// Mass, MassTOF and MassComb of one cut index, absent masses skipped
fn fill_masses(book: &mut HistogramBook, suffix: &str, index: usize, masses: &CandidateMasses, weight: f64) {
    let fills = [
        ("Mass", masses.ionization),
        ("MassTOF", masses.tof),
        ("MassComb", masses.combined),
    ];
    for (name, mass) in fills {
        if let Some(m) = mass {
            book.fill_cut(&format!("{name}{suffix}"), index, m, weight);
        }
    }
}

/// Event counters of one run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    pub events: u64,
    pub triggered: u64,
    pub corrupt: u64,
    pub candidates: u64,
    pub preselected: u64,
    pub selected_events: u64,
}

impl RunStats {
    pub fn summary(&self) -> String {
        format!(
            "RunStats: {} events, {} triggered, {} corrupt, {} candidates, {} preselected, {} events selected",
            self.events, self.triggered, self.corrupt, self.candidates, self.preselected, self.selected_events
        )
    }
}

/// Owns everything a run needs, built once from the configuration.
pub struct Analyzer {
    config: AnalysisConfig,
    preselection: Preselection,
    suite: EstimatorSuite,
    grid: CutGrid,
    templates: Option<DeDxTemplates>,
    gains: Option<TrackerGains>,
    trigger_mu: Vec<Regex>,
    trigger_met: Vec<Regex>,
    rng: StdRng,
    book: HistogramBook,
    diagnostics: PreselectionDiagnostics,
    stats: RunStats,
}

impl Analyzer {
    /// Validate the configuration, load the calibrations and build the grids.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let templates = config.template_path.as_ref().map(load_templates).transpose()?;
        let gains = config.gains_path.as_ref().map(load_gains).transpose()?;
        if templates.is_none() && config.mode.uses_ionization() {
            warn!("no dE/dx templates configured, Ias is absent and every {} candidate fails the dE/dx gates", config.mode);
        }

        let mut analyzer = Self::build(config)?;
        analyzer.templates = templates;
        analyzer.gains = gains;
        Ok(analyzer)
    }

    fn build(config: AnalysisConfig) -> Result<Self> {
        let (trigger_mu, trigger_met) = config.trigger_regexes()?;
        let mode = config.mode;
        let grid = CutGrid::for_mode(mode, &config.cuts);
        let book = HistogramBook::new(grid.len(Region::Nominal), grid.len(Region::Flip));
        info!(
            "{} analysis on {:?} sample: {} nominal and {} flipped cut points",
            mode,
            config.sample,
            grid.len(Region::Nominal),
            grid.len(Region::Flip)
        );

        Ok(Analyzer {
            preselection: Preselection::new(mode, config.cuts.clone()),
            suite: EstimatorSuite::for_mode(mode, config.use_template_layer, config.fmip_threshold),
            grid,
            templates: None,
            gains: None,
            trigger_mu,
            trigger_met,
            rng: StdRng::seed_from_u64(config.seed),
            book,
            diagnostics: PreselectionDiagnostics::new(),
            stats: RunStats::default(),
            config,
        })
    }

    /// Use in-memory templates instead of a template file.
    pub fn with_templates(mut self, templates: DeDxTemplates) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_gains(mut self, gains: TrackerGains) -> Self {
        self.gains = Some(gains);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn grid(&self) -> &CutGrid {
        &self.grid
    }

    pub fn book(&self) -> &HistogramBook {
        &self.book
    }

    pub fn diagnostics(&self) -> &PreselectionDiagnostics {
        &self.diagnostics
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Reject events whose content cannot be evaluated.
    fn check_event(event: &EventRecord) -> Result<()> {
        let corrupt = |reason: String| AnalysisError::CorruptInput { event: event.event, reason };

        if !event.pileup_weight.is_finite() || event.pileup_weight < 0.0 {
            return Err(corrupt(format!("pileup weight {}", event.pileup_weight)));
        }
        for (i, cand) in event.candidates.iter().enumerate() {
            if let Some(track) = &cand.track {
                let pt = track.pt();
                if !pt.is_finite() || pt <= 0.0 || !track.pt_error.is_finite() {
                    return Err(corrupt(format!("candidate {i} has track pt {pt}")));
                }
            }
            if let Some(hits) = &cand.hits {
                if let Some(hit) = hits.iter().find(|h| !h.charge.is_finite() || !h.path_length.is_finite()) {
                    return Err(corrupt(format!("candidate {i} has a non finite hit on {}", hit.det_id)));
                }
            }
        }
        Ok(())
    }

    /// evaluate one event
    ///
    /// Arguments:
    ///
    /// * `event` - the event record
    ///
    /// Returns:
    ///
    /// * `Ok(Some(row))` for a triggered event, `Ok(None)` when no trigger fired,
    ///   `Err(CorruptInput)` when the event content is inconsistent
    pub fn analyze_event(&mut self, event: &EventRecord) -> Result<Option<EventRow>> {
        self.stats.events += 1;
        Self::check_event(event)?;

        let mode = self.config.mode;
        let sample = self.config.sample;
        let params = self.config.bethe_bloch;
        let weight = if sample.is_mc() { event.pileup_weight } else { 1.0 };
        let unit = Binning::new(1, 0.0, 1.0);

        self.book.fill_with("TotalE", unit, 0.0, weight);
        self.book.fill_with("TotalEPU", unit, 0.0, weight * event.pileup_syst_factor);

        let trigger = classify_trigger(&event.fired_triggers, &self.trigger_mu, &self.trigger_met);
        if trigger == 0 {
            debug!("event {}: no trigger fired, skipping", event.event);
            return Ok(None);
        }
        self.stats.triggered += 1;
        self.book.fill_with("TotalTE", unit, 0.0, weight);

        if sample.is_signal() {
            for gen in event.candidates.iter().filter_map(|c| c.gen) {
                self.book.fill_with("Gen_Beta", Binning::new(20, 0.0, 1.0), gen.beta, weight);
            }
        }

        let mut ctx = DeDxContext::new(self.config.scale_factors);
        if let Some(t) = self.templates.as_ref() {
            ctx = ctx.with_templates(t);
        }
        if let Some(g) = self.gains.as_ref() {
            ctx = ctx.with_gains(g);
        }

        let n_flip = self.grid.len(Region::Flip);
        let mut acc = EvaluationAccumulator::new(self.grid.len(Region::Nominal));
        let mut flip_passed = vec![false; n_flip];
        let mut rows = Vec::with_capacity(event.candidates.len());

        for (index, cand) in event.candidates.iter().enumerate() {
            self.stats.candidates += 1;

            let track = match self.preselection.resolve_track(cand) {
                Some(t) => t,
                None => {
                    trace!("event {}: candidate {} has no track for {}", event.event, index, mode);
                    self.diagnostics.record_failure(Gate::CandidateType);
                    continue;
                }
            };

            let abs_eta = track.eta().abs();
            if abs_eta < self.config.eta_min || abs_eta > self.config.eta_max {
                trace!("event {}: candidate {} outside the eta window", event.event, index);
                self.diagnostics.record_failure(Gate::Eta);
                continue;
            }

            if sample.is_mc() && mode == AnalysisMode::TofOnly && tof_only_eta_scale(track.eta()) < self.rng.gen::<f64>() {
                trace!("event {}: candidate {} dropped by the TOF-only eta scale factor", event.event, index);
                continue;
            }

            if cand.hits.is_none() && mode.uses_ionization() {
                trace!("event {}: candidate {} without dE/dx hits", event.event, index);
                continue;
            }

            let particle_id = if sample.is_signal() {
                cand.gen.map_or(0, |g| g.pdg_id.unsigned_abs())
            } else {
                0
            };
            let estimators: Option<TrackEstimators> =
                cand.hits.as_ref().map(|hits| self.suite.evaluate(hits, &ctx, particle_id));
            let est = estimators.as_ref();

            let is = est.and_then(|e| e.is_value());
            let ih = est.and_then(|e| e.ih_value());
            let inverse_beta = cand.tof.map(|t| t.combined.inverse_beta);
            let open_angle = event.opening_angle(index);
            let input = CandidateInput { candidate: cand, estimators: est, open_angle };
            let masses = CandidateMasses::compute(track, est, inverse_beta, &params);

            if sample.is_signal() {
                let engine = SystematicsEngine {
                    preselection: &self.preselection,
                    grid: &self.grid,
                    params,
                    shifts: &self.config.shifts,
                };
                let syst = SystematicsInput { event, candidate: input, track, is, ih, inverse_beta, weight };
                engine.run(&syst, &mut acc);
            }

            let options = PreselectionOptions::default().with_weight(weight);
            let outcome = self.preselection.evaluate(
                event,
                &input,
                &options,
                Some(&mut self.book as &mut dyn PreselectionMonitor),
            );
            let reduced_pass = self
                .preselection
                .passes(event, &input, &PreselectionOptions::reduced().with_weight(weight));
            self.diagnostics.record(&outcome);

            if mode == AnalysisMode::MultiplyCharged && outcome.cosmic.is_semi_cosmic() {
                trace!("event {}: candidate {} is semi cosmic", event.event, index);
                continue;
            }

            if outcome.passed {
                self.stats.preselected += 1;
                fill_control(&mut self.book, track.pt(), is, ih, inverse_beta, masses.primary(mode), weight);
            }

            if mode == AnalysisMode::MultiplyCharged && outcome.cosmic.is_cosmic() {
                trace!("event {}: candidate {} is cosmic", event.event, index);
                continue;
            }

            let nominal = Rescale::default();
            let obs = SelectionInput::from_track(mode, track, is, inverse_beta, &nominal);

            if outcome.passed && !sample.is_signal() {
                let flipped = CandidateMasses::mirrored(track, est, inverse_beta, &params);
                for i in self.grid.passing(mode, Region::Flip, &obs, &nominal) {
                    flip_passed[i] = true;
                    fill_masses(&mut self.book, "_Flip", i, &flipped, weight);
                }
            }

            if outcome.passed {
                for i in self.grid.passing(mode, Region::Nominal, &obs, &nominal) {
                    acc.record(Variation::Nominal, i, masses.primary(mode));
                    acc.record(Variation::IonizationUp, i, masses.ionization_up);
                    acc.record(Variation::IonizationDown, i, masses.ionization_down);
                    fill_masses(&mut self.book, "", i, &masses, weight);
                    if let Some(m) = masses.ionization_up {
                        self.book.fill_cut(&format!("Mass{}", Variation::IonizationUp.suffix()), i, m, weight);
                    }
                    if let Some(m) = masses.ionization_down {
                        self.book.fill_cut(&format!("Mass{}", Variation::IonizationDown.suffix()), i, m, weight);
                    }
                }
            }

            let row_ctx = RowContext {
                index,
                track,
                estimators: est,
                masses: &masses,
                outcome: &outcome,
                reduced_pass,
                open_angle,
                ick: ih.map(|v| reduced_ionization(v, &params)),
            };
            rows.push(CandidateRow::new(cand, &row_ctx));
        }

        self.book.fill_event(&acc, weight, event.pileup_syst_factor);
        let flip_binning = Binning::new(n_flip, 0.0, n_flip as f64);
        for (i, _) in flip_passed.iter().enumerate().filter(|(_, p)| **p) {
            self.book.fill_with("HSCPE_Flip", flip_binning, i as f64, weight);
        }
        if acc.any_passed(Variation::Nominal) {
            self.stats.selected_events += 1;
        }

        Ok(Some(EventRow {
            run: event.run,
            lumi: event.lumi,
            event: event.event,
            trigger,
            n_vertices: event.vertices.len(),
            n_candidates: event.candidates.len(),
            weight,
            candidates: rows,
        }))
    }

    /// Evaluate a sequence of events, skipping corrupt ones.
    pub fn run<'e>(&mut self, events: impl IntoIterator<Item = &'e EventRecord>) -> Vec<EventRow> {
        let mut rows = Vec::new();
        for event in events {
            match self.analyze_event(event) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(e) => {
                    warn!("{}, event skipped", e);
                    self.stats.corrupt += 1;
                }
            }
        }
        rows
    }

    /// Log the run summary and hand back the histograms.
    pub fn finish(self) -> (HistogramBook, PreselectionDiagnostics, RunStats) {
        info!("{}", self.stats.summary());
        info!("{}", self.diagnostics.summary());
        (self.book, self.diagnostics, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleType;
    use crate::event::candidate::HscpCandidate;
    use crate::event::fixtures::*;
    use hscpcore::dedx::calibration::TemplateSlice;
    use hscpcore::detector::hit::{DeDxHit, DetId, HitCollection, SubDetector};

    fn templates() -> DeDxTemplates {
        DeDxTemplates::new(
            vec![0.0, 1.0],
            vec![0.0, 100.0],
            vec![TemplateSlice { region: 0, particle_id: 0, cumulative: vec![0.9] }],
        )
        .unwrap()
    }

    // eight pixel hits of 4.2 MeV/cm each
    fn heavy_hits() -> HitCollection {
        let hits = (0..8)
            .map(|i| {
                let layer = (i % 4) as u8 + 1;
                DeDxHit::pixel(DetId::tracker(SubDetector::PixelBarrel, i + 1), layer, 4.2 * 0.03 / 3.61e-6, 0.03)
                    .with_probabilities(0.4, 0.5)
            })
            .collect();
        HitCollection::new(hits)
    }

    fn config(mode: AnalysisMode, sample: SampleType) -> AnalysisConfig {
        AnalysisConfig::new(mode, sample)
    }

    fn triggered(candidates: Vec<HscpCandidate>) -> EventRecord {
        let mut ev = event_with(candidates);
        ev.fired_triggers = vec!["HLT_Mu50_v3".to_string()];
        ev
    }

    fn heavy_candidate() -> HscpCandidate {
        let mut cand = tracker_candidate(good_track(120.0, 0.5, 0.3));
        cand.hits = Some(heavy_hits());
        cand
    }

    #[test]
    fn test_eta_scale_table() {
        assert_eq!(tof_only_eta_scale(-2.5), 0.0);
        assert_eq!(tof_only_eta_scale(-2.0), 0.97);
        assert_eq!(tof_only_eta_scale(0.1), 0.92);
        assert_eq!(tof_only_eta_scale(2.0), 0.99);
        assert_eq!(tof_only_eta_scale(2.2), 0.0);
    }

    #[test]
    fn test_trigger_classes() {
        let mu = vec![Regex::new("^HLT_Mu50_v").unwrap()];
        let met = vec![Regex::new("^HLT_PFMET120").unwrap()];
        let fired = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(classify_trigger(&fired(&[]), &mu, &met), 0);
        assert_eq!(classify_trigger(&fired(&["HLT_Mu50_v2"]), &mu, &met), 1);
        assert_eq!(classify_trigger(&fired(&["HLT_PFMET120_PFMHT120_IDTight_v9"]), &mu, &met), 2);
        assert_eq!(classify_trigger(&fired(&["HLT_Mu50_v2", "HLT_PFMET120_x"]), &mu, &met), 3);
        assert_eq!(classify_trigger(&fired(&["HLT_IsoMu24_v1"]), &mu, &met), 0);
    }

    #[test]
    fn test_untriggered_event_is_skipped() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Data)).unwrap();
        let ev = event_with(vec![heavy_candidate()]);
        assert!(analyzer.analyze_event(&ev).unwrap().is_none());
        assert_eq!(analyzer.book().get("TotalE").unwrap().integral(), 1.0);
        assert!(analyzer.book().get("TotalTE").is_none());
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_heavy_tracker_candidate_is_selected() {
        init_logs();
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Data))
            .unwrap()
            .with_templates(templates());
        let row = analyzer.analyze_event(&triggered(vec![heavy_candidate()])).unwrap().unwrap();

        assert_eq!(row.trigger, 1);
        assert_eq!(row.candidates.len(), 1);
        let cand = &row.candidates[0];
        assert!(cand.pass_preselection, "failed at {:?}", cand.failed_at);
        assert!(cand.pass_preselection_no_ih_no_iso);
        assert!((cand.ih.unwrap() - 4.2).abs() < 1e-9);
        assert!(cand.tof.is_none());
        let mass = cand.mass.unwrap();
        assert!(mass.is_finite() && mass > 0.0);

        let book = analyzer.book();
        // the loosest cut point always passes a preselected candidate
        assert_eq!(book.count("HSCPE", 0), 1.0);
        // Ias sits above every ionization threshold, so only pT decides
        let ias = cand.ias.unwrap();
        let points = analyzer.grid().points(Region::Nominal);
        assert!(points.iter().all(|p| p.ionization.map_or(true, |cut| ias >= cut)));
        for (i, point) in points.iter().enumerate() {
            let expected = if point.pt.map_or(true, |cut| 120.0 >= cut) { 1.0 } else { 0.0 };
            assert_eq!(book.count("HSCPE", i), expected, "cut index {i} {point:?}");
        }
        assert!(book.get_cut("Mass", 0).is_some());
        assert!(book.get_cut("MaxEventMass", 0).is_some());
        assert!(book.get_cut("Mass_Flip", 0).is_some());
        assert!(book.get("Control_Pt").is_some());
        assert_eq!(book.get("MPt").unwrap().integral(), 1.0);
        assert_eq!(analyzer.stats().selected_events, 1);
    }

    #[test]
    fn test_candidate_above_the_grid_passes_every_cut_index() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Data))
            .unwrap()
            .with_templates(templates());
        let mut cand = tracker_candidate(good_track(250.0, 0.5, 0.3));
        cand.hits = Some(heavy_hits());
        analyzer.analyze_event(&triggered(vec![cand])).unwrap().unwrap();

        let n = analyzer.grid().len(Region::Nominal);
        assert!(n > 1);
        for i in 0..n {
            assert_eq!(analyzer.book().count("HSCPE", i), 1.0, "cut index {i}");
            assert!(analyzer.book().get_cut("MaxEventMass", i).is_some());
        }
    }

    #[test]
    fn test_zero_hits_fail_the_dedx_gate() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Data))
            .unwrap()
            .with_templates(templates());
        let mut cand = heavy_candidate();
        cand.hits = Some(HitCollection::default());
        let row = analyzer.analyze_event(&triggered(vec![cand])).unwrap().unwrap();

        let cand = &row.candidates[0];
        assert!(!cand.pass_preselection);
        assert_eq!(cand.failed_at, Some(Gate::DeDxMeasurements));
        assert!(cand.ih.is_none() && cand.mass.is_none());
        assert_eq!(analyzer.book().count("HSCPE", 0), 0.0);
        assert_eq!(analyzer.diagnostics().failed_at(Gate::DeDxMeasurements), 1);
    }

    #[test]
    fn test_tof_only_without_muon_is_rejected_quietly() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TofOnly, SampleType::Data)).unwrap();
        let mut cand = standalone_candidate(good_track(200.0, 0.2, 0.1), 10.0);
        cand.muon = None;
        let row = analyzer.analyze_event(&triggered(vec![cand])).unwrap().unwrap();

        assert!(row.candidates.is_empty());
        assert_eq!(analyzer.diagnostics().failed_at(Gate::CandidateType), 1);
        assert!(analyzer.book().histograms.keys().all(|k| !k.starts_with("BS_")));
    }

    #[test]
    fn test_eta_window() {
        let mut cfg = config(AnalysisMode::TrackerOnly, SampleType::Data);
        cfg.eta_min = 0.9;
        let mut analyzer = Analyzer::new(cfg).unwrap().with_templates(templates());
        let row = analyzer.analyze_event(&triggered(vec![heavy_candidate()])).unwrap().unwrap();
        assert!(row.candidates.is_empty());
        assert_eq!(analyzer.diagnostics().failed_at(Gate::Eta), 1);
    }

    #[test]
    fn test_signal_runs_the_variations() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Signal))
            .unwrap()
            .with_templates(templates());
        let mut ev = triggered(vec![heavy_candidate()]);
        ev.pileup_weight = 0.5;
        ev.pileup_syst_factor = 2.0;
        analyzer.analyze_event(&ev).unwrap();

        let book = analyzer.book();
        assert_eq!(book.count("HSCPE", 0), 0.5);
        assert_eq!(book.count("HSCPE_SystPU", 0), 1.0);
        assert_eq!(book.count("HSCPE_SystM", 0), 0.5);
        assert_eq!(book.count("HSCPE_SystHUp", 0), 0.5);
        // no control region for signal
        assert!(book.get_cut("Mass_Flip", 0).is_none());
    }

    #[test]
    fn test_corrupt_event_is_counted_and_skipped() {
        let mut analyzer = Analyzer::new(config(AnalysisMode::TrackerOnly, SampleType::Data))
            .unwrap()
            .with_templates(templates());
        let mut bad = triggered(vec![heavy_candidate()]);
        bad.pileup_weight = f64::NAN;
        bad.event = 7;
        assert!(matches!(
            analyzer.analyze_event(&bad),
            Err(AnalysisError::CorruptInput { event: 7, .. })
        ));

        let good = triggered(vec![heavy_candidate()]);
        let rows = analyzer.run([&bad, &good]);
        assert_eq!(rows.len(), 1);
        let (_, _, stats) = analyzer.finish();
        assert_eq!(stats.corrupt, 1);
        assert_eq!(stats.events, 3);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut analyzer = Analyzer::new(config(AnalysisMode::TofOnly, SampleType::Background)).unwrap();
            let events: Vec<EventRecord> = (0..20)
                .map(|i| {
                    let cand = standalone_candidate(good_track(200.0, -1.0 + 0.1 * i as f64, 0.1), 10.0);
                    triggered(vec![cand])
                })
                .collect();
            analyzer.run(&events).iter().map(|r| r.candidates.len()).sum::<usize>()
        };
        assert_eq!(run(), run());
    }
}

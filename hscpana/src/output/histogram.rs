use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::accumulator::{EvaluationAccumulator, Variation};
use crate::analysis::preselection::{Gate, PreselectionMonitor};

/// Fixed, equal width binning
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub n_bins: usize,
    pub low: f64,
    pub high: f64,
}

impl Binning {
    pub fn new(n_bins: usize, low: f64, high: f64) -> Self {
        Binning { n_bins: n_bins.max(1), low, high }
    }

    /// Storage index with 0 the underflow and `n_bins + 1` the overflow bin.
    #[inline]
    pub fn index(&self, x: f64) -> usize {
        if x.is_nan() || x >= self.high {
            return self.n_bins + 1;
        }
        if x < self.low {
            return 0;
        }
        let width = (self.high - self.low) / self.n_bins as f64;
        1 + (((x - self.low) / width) as usize).min(self.n_bins - 1)
    }

    pub fn center(&self, bin: usize) -> f64 {
        let width = (self.high - self.low) / self.n_bins as f64;
        self.low + (bin as f64 - 0.5) * width
    }
}

// mass axis in GeV
pub const MASS_BINNING: Binning = Binning { n_bins: 200, low: 0.0, high: 2000.0 };

/// One dimensional histogram with sum of weights and sum of squared weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub binning: Binning,
    pub sumw: Vec<f64>,
    pub sumw2: Vec<f64>,
    pub entries: u64,
}

impl Histogram1D {
    pub fn new(binning: Binning) -> Self {
        let n = binning.n_bins + 2;
        Histogram1D {
            binning,
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            entries: 0,
        }
    }

    #[inline]
    pub fn fill(&mut self, x: f64, weight: f64) {
        let i = self.binning.index(x);
        self.sumw[i] += weight;
        self.sumw2[i] += weight * weight;
        self.entries += 1;
    }

    /// content of bin `bin`, 1-based like the storage
    pub fn content(&self, bin: usize) -> f64 {
        self.sumw.get(bin).copied().unwrap_or(0.0)
    }

    pub fn error(&self, bin: usize) -> f64 {
        self.sumw2.get(bin).copied().unwrap_or(0.0).sqrt()
    }

    pub fn underflow(&self) -> f64 {
        self.sumw[0]
    }

    pub fn overflow(&self) -> f64 {
        self.sumw[self.binning.n_bins + 1]
    }

    /// Sum of weights in range, flow bins excluded.
    pub fn integral(&self) -> f64 {
        self.sumw[1..=self.binning.n_bins].iter().sum()
    }
}

/// A lazily allocated histogram per cut index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutIndexedHistogram {
    pub binning: Binning,
    pub per_index: BTreeMap<usize, Histogram1D>,
}

impl CutIndexedHistogram {
    pub fn new(binning: Binning) -> Self {
        CutIndexedHistogram { binning, per_index: BTreeMap::new() }
    }

    pub fn fill(&mut self, index: usize, x: f64, weight: f64) {
        let binning = self.binning;
        self.per_index
            .entry(index)
            .or_insert_with(|| Histogram1D::new(binning))
            .fill(x, weight);
    }

    pub fn get(&self, index: usize) -> Option<&Histogram1D> {
        self.per_index.get(&index)
    }
}

fn gate_binning(gate: Gate) -> Binning {
    match gate {
        Gate::Eta => Binning::new(60, -3.0, 3.0),
        Gate::MuonStations => Binning::new(10, 0.0, 10.0),
        Gate::Vertex => Binning::new(100, 0.0, 100.0),
        Gate::HitPattern | Gate::DeDxMeasurements => Binning::new(50, 0.0, 50.0),
        Gate::PixelProbability => Binning::new(100, 0.0, 1.0),
        Gate::TofNdof => Binning::new(60, 0.0, 60.0),
        Gate::Chi2 => Binning::new(100, 0.0, 20.0),
        Gate::Pt => Binning::new(200, 0.0, 2000.0),
        Gate::Ionization => Binning::new(100, 0.0, 15.0),
        Gate::TofError => Binning::new(100, 0.0, 0.5),
        Gate::CosmicTiming => Binning::new(100, -150.0, 150.0),
        Gate::ImpactParameter3D => Binning::new(100, 0.0, 10.0),
        Gate::Dxy | Gate::Dz => Binning::new(200, -10.0, 10.0),
        Gate::Isolation => Binning::new(100, 0.0, 100.0),
        Gate::PtError => Binning::new(100, 0.0, 1.0),
        Gate::SegmentSeparation => Binning::new(100, -2.0, 2.0),
        Gate::CandidateType | Gate::HighPurity => Binning::new(2, 0.0, 2.0),
    }
}

/// Named histograms of one run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramBook {
    pub histograms: BTreeMap<String, Histogram1D>,
    pub per_cut: BTreeMap<String, CutIndexedHistogram>,
}

impl HistogramBook {
    /// Book the per event count histograms of every variation.
    ///
    /// Arguments:
    ///
    /// * `n_nominal` - size of the nominal cut grid
    /// * `n_flip` - size of the flipped cut grid
    pub fn new(n_nominal: usize, n_flip: usize) -> Self {
        let mut book = HistogramBook::default();
        for v in Variation::ALL {
            book.book(&format!("HSCPE{}", v.suffix()), Binning::new(n_nominal, 0.0, n_nominal as f64));
        }
        book.book("HSCPE_Flip", Binning::new(n_flip, 0.0, n_flip as f64));
        book
    }

    pub fn book(&mut self, name: &str, binning: Binning) {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram1D::new(binning));
    }

    /// Fill a named histogram, booking it with `binning` on first use.
    pub fn fill_with(&mut self, name: &str, binning: Binning, x: f64, weight: f64) {
        match self.histograms.get_mut(name) {
            Some(h) => h.fill(x, weight),
            None => {
                let mut h = Histogram1D::new(binning);
                h.fill(x, weight);
                self.histograms.insert(name.to_string(), h);
            }
        }
    }

    /// Fill a histogram of cut index `index`, mass binning on first use.
    pub fn fill_cut(&mut self, name: &str, index: usize, x: f64, weight: f64) {
        match self.per_cut.get_mut(name) {
            Some(h) => h.fill(index, x, weight),
            None => {
                let mut h = CutIndexedHistogram::new(MASS_BINNING);
                h.fill(index, x, weight);
                self.per_cut.insert(name.to_string(), h);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Histogram1D> {
        self.histograms.get(name)
    }

    pub fn get_cut(&self, name: &str, index: usize) -> Option<&Histogram1D> {
        self.per_cut.get(name).and_then(|h| h.get(index))
    }

    /// fill the end of event histograms from the event accumulator
    ///
    /// Arguments:
    ///
    /// * `acc` - accumulator of the finished event
    /// * `weight` - event weight
    /// * `pileup_factor` - extra weight factor of the pileup variation
    pub fn fill_event(&mut self, acc: &EvaluationAccumulator, weight: f64, pileup_factor: f64) {
        for v in Variation::ALL {
            let w = if v == Variation::Pileup { weight * pileup_factor } else { weight };
            let count_name = format!("HSCPE{}", v.suffix());
            let mass_name = format!("MaxEventMass{}", v.suffix());
            for (index, mass) in acc.passing(v) {
                self.fill_with(&count_name, Binning::new(acc.n_cuts(), 0.0, acc.n_cuts() as f64), index as f64, w);
                if let Some(m) = mass {
                    self.fill_cut(&mass_name, index, m, w);
                }
            }
        }
    }

    /// Sum of weights of a count histogram in cut index `index`.
    pub fn count(&self, name: &str, index: usize) -> f64 {
        self.get(name).map_or(0.0, |h| h.content(index + 1))
    }
}

impl PreselectionMonitor for HistogramBook {
    fn before_cut(&mut self, gate: Gate, value: f64, weight: f64) {
        self.fill_with(&format!("BS_{}", gate.name()), gate_binning(gate), value, weight);
    }

    fn after_cut(&mut self, gate: Gate, value: f64, weight: f64) {
        self.fill_with(gate.name(), gate_binning(gate), value, weight);
    }
}

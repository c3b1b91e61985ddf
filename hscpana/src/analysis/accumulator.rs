//! Per event bookkeeping of which cut points any candidate passed and the
//! largest mass seen there, for every systematic variation.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variation {
    Nominal,
    MomentumScale,
    IonizationScale,
    MassScale,
    TofScale,
    Pileup,
    IonizationUp,
    IonizationDown,
}

impl Variation {
    pub const COUNT: usize = 8;

    pub const ALL: [Variation; Variation::COUNT] = [
        Variation::Nominal,
        Variation::MomentumScale,
        Variation::IonizationScale,
        Variation::MassScale,
        Variation::TofScale,
        Variation::Pileup,
        Variation::IonizationUp,
        Variation::IonizationDown,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Suffix of the histograms filled for this variation
    pub fn suffix(&self) -> &'static str {
        match self {
            Variation::Nominal => "",
            Variation::MomentumScale => "_SystP",
            Variation::IonizationScale => "_SystI",
            Variation::MassScale => "_SystM",
            Variation::TofScale => "_SystT",
            Variation::Pileup => "_SystPU",
            Variation::IonizationUp => "_SystHUp",
            Variation::IonizationDown => "_SystHDown",
        }
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    passed: Vec<bool>,
    max_mass: Vec<Option<f64>>,
}

/// Pass flags and maximum masses per variation and cut index.
///
/// Built fresh for every event; nothing carries over between events.
#[derive(Clone, Debug)]
pub struct EvaluationAccumulator {
    n_cuts: usize,
    slots: Vec<Slot>,
}

impl EvaluationAccumulator {
    pub fn new(n_cuts: usize) -> Self {
        let slot = Slot {
            passed: vec![false; n_cuts],
            max_mass: vec![None; n_cuts],
        };
        EvaluationAccumulator {
            n_cuts,
            slots: vec![slot; Variation::COUNT],
        }
    }

    pub fn n_cuts(&self) -> usize {
        self.n_cuts
    }

    /// Mark cut point `index` as passed and keep the larger mass.
    ///
    /// An absent mass sets the pass flag without touching the maximum.
    /// Indices outside the grid are ignored.
    pub fn record(&mut self, variation: Variation, index: usize, mass: Option<f64>) {
        let slot = &mut self.slots[variation.index()];
        if index >= slot.passed.len() {
            return;
        }
        slot.passed[index] = true;
        if let Some(m) = mass {
            let current = &mut slot.max_mass[index];
            *current = Some(current.map_or(m, |c| c.max(m)));
        }
    }

    pub fn passed(&self, variation: Variation, index: usize) -> bool {
        self.slots[variation.index()].passed.get(index).copied().unwrap_or(false)
    }

    pub fn max_mass(&self, variation: Variation, index: usize) -> Option<f64> {
        self.slots[variation.index()].max_mass.get(index).copied().flatten()
    }

    /// Passed cut indices of one variation with their maximum mass.
    pub fn passing(&self, variation: Variation) -> impl Iterator<Item = (usize, Option<f64>)> + '_ {
        let slot = &self.slots[variation.index()];
        slot.passed
            .iter()
            .zip(slot.max_mass.iter())
            .enumerate()
            .filter(|(_, (passed, _))| **passed)
            .map(|(i, (_, mass))| (i, *mass))
    }

    pub fn any_passed(&self, variation: Variation) -> bool {
        self.slots[variation.index()].passed.iter().any(|&p| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_accumulator_is_empty() {
        let acc = EvaluationAccumulator::new(4);
        for v in Variation::ALL {
            assert!(!acc.any_passed(v));
            assert_eq!(acc.passing(v).count(), 0);
        }
        assert_eq!(acc.max_mass(Variation::Nominal, 0), None);
    }

    #[test]
    fn test_record_keeps_maximum() {
        let mut acc = EvaluationAccumulator::new(3);
        acc.record(Variation::Nominal, 1, Some(300.0));
        acc.record(Variation::Nominal, 1, Some(250.0));
        acc.record(Variation::Nominal, 1, Some(410.0));
        assert_eq!(acc.max_mass(Variation::Nominal, 1), Some(410.0));
        assert!(acc.passed(Variation::Nominal, 1));
        assert!(!acc.passed(Variation::Nominal, 0));
        // other variations untouched
        assert!(!acc.passed(Variation::Pileup, 1));
    }

    #[test]
    fn test_absent_mass_sets_flag_only() {
        let mut acc = EvaluationAccumulator::new(2);
        acc.record(Variation::MassScale, 0, None);
        assert!(acc.passed(Variation::MassScale, 0));
        assert_eq!(acc.max_mass(Variation::MassScale, 0), None);
        acc.record(Variation::MassScale, 0, Some(120.0));
        acc.record(Variation::MassScale, 0, None);
        assert_eq!(acc.max_mass(Variation::MassScale, 0), Some(120.0));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut acc = EvaluationAccumulator::new(2);
        acc.record(Variation::Nominal, 7, Some(1.0));
        assert!(!acc.any_passed(Variation::Nominal));
        assert!(!acc.passed(Variation::Nominal, 7));
    }

    #[test]
    fn test_passing_lists_indices_with_masses() {
        let mut acc = EvaluationAccumulator::new(4);
        acc.record(Variation::IonizationUp, 0, Some(200.0));
        acc.record(Variation::IonizationUp, 2, None);
        let passing: Vec<_> = acc.passing(Variation::IonizationUp).collect();
        assert_eq!(passing, vec![(0, Some(200.0)), (2, None)]);
    }

    #[test]
    fn test_suffixes_are_distinct() {
        let mut suffixes: Vec<&str> = Variation::ALL.iter().map(|v| v.suffix()).collect();
        suffixes.sort();
        suffixes.dedup();
        assert_eq!(suffixes.len(), Variation::COUNT);
    }
}

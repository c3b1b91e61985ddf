//! Read-only calibration lookups used by the dE/dx estimators.
//!
//! Tables are loaded once at startup and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::hit::{DeDxHit, DetId};

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("template slice {region}/{particle_id} has {got} entries, expected {expected}")]
    ShapeMismatch { region: u32, particle_id: u32, expected: usize, got: usize },

    #[error("axis {0} must have at least two increasing edges")]
    BadAxis(&'static str),

    #[error("gain for module {0} is not positive")]
    BadGain(u32),
}

/// Pixel and strip dE/dx scale factors
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub pixel: f64,
    pub strip: f64,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        ScaleFactors { pixel: 1.0, strip: 1.0 }
    }
}

/// Probability of observing a deposit below `charge_over_path` for a minimum
/// ionizing particle crossing the hit's module.
pub trait HitProbabilityLookup {
    fn probability(&self, hit: &DeDxHit, charge_over_path: f64, use_layer: bool, particle_id: u32) -> Option<f64>;
}

/// Per-module strip gain
pub trait GainCorrection {
    fn gain(&self, det_id: DetId) -> Option<f64>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateSlice {
    // 0 for the tracker wide template, otherwise subdet * 100 + layer
    pub region: u32,
    pub particle_id: u32,
    // cumulative probabilities, path length major
    pub cumulative: Vec<f64>,
}

/// Binned dE/dx templates in (path length, charge over path length)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeDxTemplates {
    pub path_edges: Vec<f64>,
    pub charge_edges: Vec<f64>,
    pub slices: Vec<TemplateSlice>,
    #[serde(skip)]
    index: HashMap<(u32, u32), usize>,
}

impl DeDxTemplates {
    pub fn new(path_edges: Vec<f64>, charge_edges: Vec<f64>, slices: Vec<TemplateSlice>) -> Result<Self, CalibrationError> {
        let mut templates = DeDxTemplates {
            path_edges,
            charge_edges,
            slices,
            index: HashMap::new(),
        };
        templates.validate()?;
        Ok(templates)
    }

    /// Check table shapes and build the slice index, call after deserializing.
    pub fn validate(&mut self) -> Result<(), CalibrationError> {
        check_axis(&self.path_edges, "path length")?;
        check_axis(&self.charge_edges, "charge over path length")?;

        let expected = (self.path_edges.len() - 1) * (self.charge_edges.len() - 1);
        self.index.clear();
        for (i, slice) in self.slices.iter().enumerate() {
            if slice.cumulative.len() != expected {
                return Err(CalibrationError::ShapeMismatch {
                    region: slice.region,
                    particle_id: slice.particle_id,
                    expected,
                    got: slice.cumulative.len(),
                });
            }
            self.index.insert((slice.region, slice.particle_id), i);
        }
        Ok(())
    }

    fn slice(&self, region: u32, particle_id: u32) -> Option<&TemplateSlice> {
        self.index
            .get(&(region, particle_id))
            .or_else(|| self.index.get(&(region, 0)))
            .or_else(|| self.index.get(&(0, particle_id)))
            .or_else(|| self.index.get(&(0, 0)))
            .map(|&i| &self.slices[i])
    }
}

fn check_axis(edges: &[f64], name: &'static str) -> Result<(), CalibrationError> {
    if edges.len() < 2 || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(CalibrationError::BadAxis(name));
    }
    Ok(())
}

// values outside the axis go to the first or last bin
fn bin_index(edges: &[f64], x: f64) -> usize {
    let n_bins = edges.len() - 1;
    edges.partition_point(|&e| e <= x).saturating_sub(1).min(n_bins - 1)
}

pub fn template_region(hit: &DeDxHit) -> u32 {
    hit.det_id.subdet_id() * 100 + hit.layer as u32
}

impl HitProbabilityLookup for DeDxTemplates {
    fn probability(&self, hit: &DeDxHit, charge_over_path: f64, use_layer: bool, particle_id: u32) -> Option<f64> {
        let region = if use_layer { template_region(hit) } else { 0 };
        let slice = self.slice(region, particle_id)?;
        let n_charge = self.charge_edges.len() - 1;
        let ip = bin_index(&self.path_edges, hit.path_length);
        let ic = bin_index(&self.charge_edges, charge_over_path);
        slice.cumulative.get(ip * n_charge + ic).copied()
    }
}

/// Strip gains keyed by raw module id
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerGains {
    gains: HashMap<u32, f64>,
}

impl TrackerGains {
    pub fn new(gains: HashMap<u32, f64>) -> Result<Self, CalibrationError> {
        if let Some((&id, _)) = gains.iter().find(|(_, &g)| !(g > 0.0)) {
            return Err(CalibrationError::BadGain(id));
        }
        Ok(TrackerGains { gains })
    }

    pub fn len(&self) -> usize {
        self.gains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }
}

impl GainCorrection for TrackerGains {
    fn gain(&self, det_id: DetId) -> Option<f64> {
        self.gains.get(&det_id.raw()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::hit::SubDetector;

    fn templates() -> DeDxTemplates {
        // two path bins, three charge bins
        DeDxTemplates::new(
            vec![0.0, 0.05, 0.1],
            vec![0.0, 3.0, 6.0, 9.0],
            vec![
                TemplateSlice { region: 0, particle_id: 0, cumulative: vec![0.1, 0.6, 0.9, 0.2, 0.7, 0.95] },
                TemplateSlice { region: 502, particle_id: 0, cumulative: vec![0.3; 6] },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_template_lookup() {
        let t = templates();
        let hit = DeDxHit::strip(DetId::tracker(SubDetector::Tob, 3), 2, vec![100], 0.07);
        assert_eq!(t.probability(&hit, 4.0, false, 0), Some(0.7));
        // overflow goes to the last bin
        assert_eq!(t.probability(&hit, 40.0, false, 0), Some(0.95));
        // per layer slice
        assert_eq!(t.probability(&hit, 4.0, true, 0), Some(0.3));
        // unknown particle falls back to the generic set
        assert_eq!(t.probability(&hit, 1.0, false, 1000021), Some(0.2));
    }

    #[test]
    fn test_template_shape_is_checked() {
        let err = DeDxTemplates::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0, 2.0],
            vec![TemplateSlice { region: 0, particle_id: 0, cumulative: vec![0.5] }],
        );
        assert!(matches!(err, Err(CalibrationError::ShapeMismatch { expected: 2, got: 1, .. })));
        assert!(DeDxTemplates::new(vec![1.0], vec![0.0, 1.0], vec![]).is_err());
    }

    #[test]
    fn test_templates_from_json_need_validation() {
        let json = r#"{"path_edges":[0.0,1.0],"charge_edges":[0.0,1.0],
            "slices":[{"region":0,"particle_id":0,"cumulative":[0.5]}]}"#;
        let mut t: DeDxTemplates = serde_json::from_str(json).unwrap();
        let hit = DeDxHit::pixel(DetId::tracker(SubDetector::PixelBarrel, 1), 2, 1.0, 0.5);
        assert_eq!(t.probability(&hit, 0.2, false, 0), None);
        t.validate().unwrap();
        assert_eq!(t.probability(&hit, 0.2, false, 0), Some(0.5));
    }

    #[test]
    fn test_gains() {
        let id = DetId::tracker(SubDetector::Tib, 9);
        let gains = TrackerGains::new(HashMap::from([(id.raw(), 1.1)])).unwrap();
        assert_eq!(gains.gain(id), Some(1.1));
        assert_eq!(gains.gain(DetId::tracker(SubDetector::Tib, 10)), None);
        assert!(TrackerGains::new(HashMap::from([(1, 0.0)])).is_err());
    }
}

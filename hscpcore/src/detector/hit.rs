use std::fmt;

use serde::{Deserialize, Serialize};

use crate::physics::constants::{STRIP_SATURATION_254, STRIP_SATURATION_255};

/// Tracker sub-detectors in readout id order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubDetector {
    PixelBarrel,
    PixelEndcap,
    Tib,
    Tid,
    Tob,
    Tec,
}

impl SubDetector {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(SubDetector::PixelBarrel),
            2 => Some(SubDetector::PixelEndcap),
            3 => Some(SubDetector::Tib),
            4 => Some(SubDetector::Tid),
            5 => Some(SubDetector::Tob),
            6 => Some(SubDetector::Tec),
            _ => None,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            SubDetector::PixelBarrel => 1,
            SubDetector::PixelEndcap => 2,
            SubDetector::Tib => 3,
            SubDetector::Tid => 4,
            SubDetector::Tob => 5,
            SubDetector::Tec => 6,
        }
    }

    pub fn is_pixel(&self) -> bool {
        matches!(self, SubDetector::PixelBarrel | SubDetector::PixelEndcap)
    }

    pub fn is_strip(&self) -> bool {
        !self.is_pixel()
    }
}

/// Raw 32 bit detector id. Bits 25-27 carry the sub-detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetId(pub u32);

impl DetId {
    const SUBDET_OFFSET: u32 = 25;
    const SUBDET_MASK: u32 = 0x7;
    const DET_OFFSET: u32 = 28;
    const TRACKER: u32 = 1;

    /// Build a tracker id from a sub-detector and a module index.
    pub fn tracker(subdet: SubDetector, module: u32) -> Self {
        DetId(
            (Self::TRACKER << Self::DET_OFFSET)
                | (subdet.id() << Self::SUBDET_OFFSET)
                | (module & ((1 << Self::SUBDET_OFFSET) - 1)),
        )
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn subdet_id(&self) -> u32 {
        (self.0 >> Self::SUBDET_OFFSET) & Self::SUBDET_MASK
    }

    pub fn subdetector(&self) -> Option<SubDetector> {
        SubDetector::from_id(self.subdet_id())
    }
}

impl fmt::Display for DetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetId({}, subdet={})", self.0, self.subdet_id())
    }
}

/// One energy deposit on a track, in traversal order.
///
/// Pixel hits carry a collected charge in electrons and the template-fit
/// probabilities. Strip hits carry raw ADC amplitudes, their charge is the
/// amplitude sum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeDxHit {
    pub det_id: DetId,
    // pixel barrel layer, strip layer or TEC wheel
    pub layer: u8,
    pub charge: f64,
    pub path_length: f64,
    #[serde(default)]
    pub amplitudes: Vec<u16>,
    #[serde(default)]
    pub prob_q: Option<f64>,
    #[serde(default)]
    pub prob_xy: Option<f64>,
    // pixel cluster shape compatible with a single particle
    #[serde(default = "default_true")]
    pub shape_ok: bool,
    #[serde(default = "default_true")]
    pub inside_module: bool,
}

fn default_true() -> bool {
    true
}

impl DeDxHit {
    pub fn pixel(det_id: DetId, layer: u8, charge: f64, path_length: f64) -> Self {
        DeDxHit {
            det_id,
            layer,
            charge,
            path_length,
            amplitudes: Vec::new(),
            prob_q: None,
            prob_xy: None,
            shape_ok: true,
            inside_module: true,
        }
    }

    pub fn strip(det_id: DetId, layer: u8, amplitudes: Vec<u16>, path_length: f64) -> Self {
        let charge = amplitudes.iter().map(|&a| a as f64).sum();
        DeDxHit {
            det_id,
            layer,
            charge,
            path_length,
            amplitudes,
            prob_q: None,
            prob_xy: None,
            shape_ok: true,
            inside_module: true,
        }
    }

    pub fn with_probabilities(mut self, prob_q: f64, prob_xy: f64) -> Self {
        self.prob_q = Some(prob_q);
        self.prob_xy = Some(prob_xy);
        self
    }

    pub fn subdetector(&self) -> Option<SubDetector> {
        self.det_id.subdetector()
    }

    pub fn is_pixel(&self) -> bool {
        self.subdetector().map_or(false, |s| s.is_pixel())
    }

    pub fn is_strip(&self) -> bool {
        self.subdetector().map_or(false, |s| s.is_strip())
    }

    pub fn is_pixel_barrel_layer1(&self) -> bool {
        self.subdetector() == Some(SubDetector::PixelBarrel) && self.layer == 1
    }

    pub fn saturates_254(&self) -> bool {
        self.amplitudes.iter().any(|&a| a >= STRIP_SATURATION_254)
    }

    pub fn saturates_255(&self) -> bool {
        self.amplitudes.iter().any(|&a| a == STRIP_SATURATION_255)
    }
}

/// Hits of one track, read-only once built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitCollection {
    hits: Vec<DeDxHit>,
}

impl HitCollection {
    pub fn new(hits: Vec<DeDxHit>) -> Self {
        HitCollection { hits }
    }

    pub fn hits(&self) -> &[DeDxHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeDxHit> {
        self.hits.iter()
    }

    pub fn pixel_hits(&self) -> impl Iterator<Item = &DeDxHit> {
        self.hits.iter().filter(|h| h.is_pixel())
    }

    pub fn strip_hits(&self) -> impl Iterator<Item = &DeDxHit> {
        self.hits.iter().filter(|h| h.is_strip())
    }
}

impl From<Vec<DeDxHit>> for HitCollection {
    fn from(hits: Vec<DeDxHit>) -> Self {
        HitCollection::new(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_det_id_subdetector() {
        for subdet in [
            SubDetector::PixelBarrel,
            SubDetector::PixelEndcap,
            SubDetector::Tib,
            SubDetector::Tid,
            SubDetector::Tob,
            SubDetector::Tec,
        ] {
            let id = DetId::tracker(subdet, 12345);
            assert_eq!(id.subdetector(), Some(subdet));
        }
        // real pixel barrel module id
        assert_eq!(DetId(303042564).subdetector(), Some(SubDetector::PixelBarrel));
        assert_eq!(DetId(0).subdetector(), None);
    }

    #[test]
    fn test_strip_charge_and_saturation() {
        let hit = DeDxHit::strip(DetId::tracker(SubDetector::Tob, 1), 2, vec![10, 254, 30], 0.05);
        assert_eq!(hit.charge, 294.0);
        assert!(hit.is_strip());
        assert!(hit.saturates_254());
        assert!(!hit.saturates_255());
    }

    #[test]
    fn test_layer1_flag() {
        let l1 = DeDxHit::pixel(DetId::tracker(SubDetector::PixelBarrel, 1), 1, 20000.0, 0.03);
        let l2 = DeDxHit::pixel(DetId::tracker(SubDetector::PixelBarrel, 1), 2, 20000.0, 0.03);
        let fwd = DeDxHit::pixel(DetId::tracker(SubDetector::PixelEndcap, 1), 1, 20000.0, 0.03);
        assert!(l1.is_pixel_barrel_layer1());
        assert!(!l2.is_pixel_barrel_layer1());
        assert!(!fwd.is_pixel_barrel_layer1());
    }
}

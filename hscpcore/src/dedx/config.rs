//! Named dE/dx estimator configurations.
//!
//! Every estimator variant computed on a track is one immutable
//! [`EstimatorConfig`] value, built once at startup and passed by reference.

use serde::{Deserialize, Serialize};

use crate::detector::hit::{DeDxHit, SubDetector};
use crate::physics::constants::{CROSS_TALK_X1, CROSS_TALK_X2, DROP_FRACTION_15, MAX_STRIP_MEASUREMENTS};

/// Which hits of a track may contribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HitSubset {
    All,
    StripOnly,
    PixelOnly,
    /// all hits except the listed regions
    Excluding(Vec<DetectorRegion>),
}

/// A named part of the tracker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorRegion {
    Pixel,
    PixelBarrelLayer1,
    Tib,
    Tid,
    Tob,
    /// TEC wheels up to and including `max_wheel`
    TecInnerWheels { max_wheel: u8 },
    Tec,
}

impl DetectorRegion {
    pub fn contains(&self, hit: &DeDxHit) -> bool {
        let subdet = match hit.subdetector() {
            Some(s) => s,
            None => return false,
        };
        match self {
            DetectorRegion::Pixel => subdet.is_pixel(),
            DetectorRegion::PixelBarrelLayer1 => hit.is_pixel_barrel_layer1(),
            DetectorRegion::Tib => subdet == SubDetector::Tib,
            DetectorRegion::Tid => subdet == SubDetector::Tid,
            DetectorRegion::Tob => subdet == SubDetector::Tob,
            DetectorRegion::TecInnerWheels { max_wheel } => {
                subdet == SubDetector::Tec && hit.layer <= *max_wheel
            }
            DetectorRegion::Tec => subdet == SubDetector::Tec,
        }
    }
}

impl HitSubset {
    #[inline]
    pub fn accepts(&self, hit: &DeDxHit) -> bool {
        match self {
            HitSubset::All => hit.is_pixel() || hit.is_strip(),
            HitSubset::StripOnly => hit.is_strip(),
            HitSubset::PixelOnly => hit.is_pixel(),
            HitSubset::Excluding(regions) => {
                (hit.is_pixel() || hit.is_strip()) && !regions.iter().any(|r| r.contains(hit))
            }
        }
    }
}

/// Correction applied to raw strip amplitudes before summing
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AmplitudeCorrection {
    None,
    CrossTalkInversion { x1: f64, x2: f64 },
    SaturationFromFits,
}

/// How per-hit values are reduced to one track value
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Combination {
    /// `(mean(x^-2))^-1/2`, the Ih family
    Harmonic2,
    /// template discriminant, the Ias family
    Discriminant,
    /// per-hit template probabilities combined like pixel probQ
    ProbabilityProduct,
}

/// One dE/dx estimator variant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub name: String,
    pub hit_subset: HitSubset,
    pub amplitude_correction: AmplitudeCorrection,
    // lowest fraction of values removed before combining
    pub drop_low_fraction: f64,
    // highest fraction of values removed before combining
    pub drop_high_fraction: f64,
    pub combination: Combination,
    pub reverse_probability: bool,
    pub cluster_cleaning: bool,
    pub must_be_inside: bool,
    pub max_strip_measurements: usize,
    // per-layer templates instead of one global template
    pub use_template_layer: bool,
    // particle hypothesis used to pick templates, 0 for the generic set
    pub particle_id: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            name: "Ih".to_string(),
            hit_subset: HitSubset::All,
            amplitude_correction: AmplitudeCorrection::CrossTalkInversion { x1: CROSS_TALK_X1, x2: CROSS_TALK_X2 },
            drop_low_fraction: 0.0,
            drop_high_fraction: 0.0,
            combination: Combination::Harmonic2,
            reverse_probability: false,
            cluster_cleaning: true,
            must_be_inside: true,
            max_strip_measurements: MAX_STRIP_MEASUREMENTS,
            use_template_layer: false,
            particle_id: 0,
        }
    }
}

impl EstimatorConfig {
    pub fn named(name: &str) -> Self {
        EstimatorConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cluster_cleaning(mut self, on: bool) -> Self {
        self.cluster_cleaning = on;
        self
    }

    pub fn with_particle_id(mut self, particle_id: u32) -> Self {
        self.particle_id = particle_id;
        self
    }

    pub fn with_template_layer(mut self, on: bool) -> Self {
        self.use_template_layer = on;
        self
    }

    pub fn needs_templates(&self) -> bool {
        !matches!(self.combination, Combination::Harmonic2)
    }

    /// Template discriminant Ias
    pub fn ias(reverse_probability: bool) -> Self {
        EstimatorConfig {
            name: "Ias".to_string(),
            combination: Combination::Discriminant,
            reverse_probability,
            ..Default::default()
        }
    }

    /// Harmonic-2 Ih, all hits
    pub fn ih() -> Self {
        EstimatorConfig::named("Ih")
    }

    /// Ih with the lowest 15% of values removed, biased upwards
    pub fn ih_up() -> Self {
        EstimatorConfig {
            name: "Ih_up".to_string(),
            drop_low_fraction: DROP_FRACTION_15,
            ..Default::default()
        }
    }

    /// Ih with the highest 15% of values removed, biased downwards
    pub fn ih_down() -> Self {
        EstimatorConfig {
            name: "Ih_down".to_string(),
            drop_high_fraction: DROP_FRACTION_15,
            ..Default::default()
        }
    }

    pub fn ih_no_l1() -> Self {
        EstimatorConfig {
            name: "Ih_noL1".to_string(),
            hit_subset: HitSubset::Excluding(vec![DetectorRegion::PixelBarrelLayer1]),
            ..Default::default()
        }
    }

    pub fn ih_15drop() -> Self {
        EstimatorConfig {
            name: "Ih_15drop".to_string(),
            drop_low_fraction: DROP_FRACTION_15,
            ..Default::default()
        }
    }

    pub fn ih_strip_only() -> Self {
        EstimatorConfig {
            name: "Ih_StripOnly".to_string(),
            hit_subset: HitSubset::StripOnly,
            ..Default::default()
        }
    }

    pub fn ih_strip_only_15drop() -> Self {
        EstimatorConfig {
            name: "Ih_StripOnly_15drop".to_string(),
            hit_subset: HitSubset::StripOnly,
            drop_low_fraction: DROP_FRACTION_15,
            ..Default::default()
        }
    }

    pub fn ih_saturation_from_fits() -> Self {
        EstimatorConfig {
            name: "Ih_SaturationCorrectionFromFits".to_string(),
            hit_subset: HitSubset::StripOnly,
            amplitude_correction: AmplitudeCorrection::SaturationFromFits,
            ..Default::default()
        }
    }

    /// Template probabilities combined into one track probability
    pub fn prob_q_dedx() -> Self {
        EstimatorConfig {
            name: "probQ_dEdx".to_string(),
            combination: Combination::ProbabilityProduct,
            reverse_probability: true,
            ..Default::default()
        }
    }

    /// Ias without pixels, TIB, TID and the first three TEC wheels
    pub fn ias_no_inner_strips() -> Self {
        EstimatorConfig {
            name: "Ias_noTIBnoTIDno3TEC".to_string(),
            hit_subset: HitSubset::Excluding(vec![
                DetectorRegion::Pixel,
                DetectorRegion::Tib,
                DetectorRegion::Tid,
                DetectorRegion::TecInnerWheels { max_wheel: 3 },
            ]),
            combination: Combination::Discriminant,
            reverse_probability: true,
            ..Default::default()
        }
    }

    pub fn ias_pixel_only() -> Self {
        EstimatorConfig {
            name: "Ias_PixelOnly".to_string(),
            hit_subset: HitSubset::PixelOnly,
            combination: Combination::Discriminant,
            reverse_probability: true,
            ..Default::default()
        }
    }
}

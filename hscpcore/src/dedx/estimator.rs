//! dE/dx estimators computed from the hits of one track.

use log::trace;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::dedx::calibration::{GainCorrection, HitProbabilityLookup, ScaleFactors};
use crate::dedx::config::{AmplitudeCorrection, Combination, EstimatorConfig};
use crate::dedx::probability::{combine_prob_values, is_degenerate};
use crate::dedx::strips::{cross_talk_inversion, saturation_correction_from_fits, strip_cluster_is_clean};
use crate::detector::hit::{DeDxHit, HitCollection};
use crate::physics::constants::{ELECTRON_PAIR_ENERGY, STRIP_CHARGE_TO_ENERGY, STRIP_SATURATION_254};

/// Value of one estimator on one track
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeDxMeasurement {
    pub value: f64,
    pub error: f64,
    pub n_measurements: usize,
}

/// Read-only inputs shared by every estimator of a run
#[derive(Clone, Copy, Default)]
pub struct DeDxContext<'a> {
    pub scale_factors: ScaleFactors,
    pub templates: Option<&'a dyn HitProbabilityLookup>,
    pub gains: Option<&'a dyn GainCorrection>,
}

impl<'a> DeDxContext<'a> {
    pub fn new(scale_factors: ScaleFactors) -> Self {
        DeDxContext {
            scale_factors,
            templates: None,
            gains: None,
        }
    }

    pub fn with_templates(mut self, templates: &'a dyn HitProbabilityLookup) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_gains(mut self, gains: &'a dyn GainCorrection) -> Self {
        self.gains = Some(gains);
        self
    }
}

/// compute one dE/dx estimator on a track
///
/// Arguments:
///
/// * `hits` - hits of the track in traversal order
/// * `ctx` - scale factors and calibration lookups
/// * `cfg` - the estimator variant
///
/// Returns:
///
/// * `Option<DeDxMeasurement>` - `None` when no hit survives the selection,
///   when the variant needs templates that are not loaded, or when a
///   probability combination is degenerate
pub fn compute_dedx(hits: &HitCollection, ctx: &DeDxContext, cfg: &EstimatorConfig) -> Option<DeDxMeasurement> {
    let accepted = per_hit_values(hits, ctx, cfg);
    if accepted.is_empty() {
        return None;
    }

    match cfg.combination {
        Combination::Harmonic2 => {
            let values: Vec<f64> = accepted.iter().map(|(_, v)| *v).collect();
            let kept = drop_fractions(values, cfg.drop_low_fraction, cfg.drop_high_fraction);
            harmonic2(&kept)
        }
        Combination::Discriminant | Combination::ProbabilityProduct => {
            let templates = match ctx.templates {
                Some(t) => t,
                None => {
                    trace!("{}: no templates loaded", cfg.name);
                    return None;
                }
            };
            let probs: Vec<f64> = accepted
                .iter()
                .filter_map(|(hit, v)| templates.probability(hit, *v, cfg.use_template_layer, cfg.particle_id))
                .map(|p| if cfg.reverse_probability { 1.0 - p } else { p })
                .collect();
            let kept = drop_fractions(probs, cfg.drop_low_fraction, cfg.drop_high_fraction);
            if kept.is_empty() {
                return None;
            }
            if cfg.combination == Combination::Discriminant {
                Some(DeDxMeasurement {
                    value: ias_discriminant(&kept),
                    error: 0.0,
                    n_measurements: kept.len(),
                })
            } else {
                let combined = combine_prob_values(&kept);
                if is_degenerate(combined) {
                    return None;
                }
                Some(DeDxMeasurement {
                    value: combined,
                    error: 0.0,
                    n_measurements: kept.len(),
                })
            }
        }
    }
}

// (hit, charge over path length in MeV/cm) for every hit passing the variant's filters
fn per_hit_values<'h>(hits: &'h HitCollection, ctx: &DeDxContext, cfg: &EstimatorConfig) -> Vec<(&'h DeDxHit, f64)> {
    let mut out = Vec::with_capacity(hits.len());
    let mut n_strips = 0usize;

    for hit in hits.iter() {
        if !cfg.hit_subset.accepts(hit) {
            continue;
        }
        if cfg.must_be_inside && !hit.inside_module {
            continue;
        }
        if hit.path_length <= 0.0 {
            trace!("{}: hit {} with non positive path length", cfg.name, hit.det_id);
            continue;
        }

        if hit.is_pixel() {
            if cfg.cluster_cleaning && !hit.shape_ok {
                continue;
            }
            let value = ctx.scale_factors.pixel * hit.charge * ELECTRON_PAIR_ENERGY / hit.path_length;
            out.push((hit, value));
        } else {
            if n_strips >= cfg.max_strip_measurements {
                continue;
            }
            if cfg.cluster_cleaning && !hit.amplitudes.is_empty() && !strip_cluster_is_clean(&hit.amplitudes, true) {
                continue;
            }
            let charge = strip_charge(hit, ctx.gains, cfg.amplitude_correction);
            let value = ctx.scale_factors.strip * charge * STRIP_CHARGE_TO_ENERGY / hit.path_length;
            out.push((hit, value));
            n_strips += 1;
        }
    }
    out
}

fn strip_charge(hit: &DeDxHit, gains: Option<&dyn GainCorrection>, correction: AmplitudeCorrection) -> f64 {
    if hit.amplitudes.is_empty() {
        return hit.charge;
    }

    let mut amplitudes: Vec<f64> = match correction {
        AmplitudeCorrection::None => hit.amplitudes.iter().map(|&a| a as f64).collect(),
        AmplitudeCorrection::CrossTalkInversion { x1, x2 } => cross_talk_inversion(&hit.amplitudes, x1, x2),
        AmplitudeCorrection::SaturationFromFits => saturation_correction_from_fits(&hit.amplitudes),
    };

    // saturated strips keep their raw value
    if let Some(gain) = gains.and_then(|g| g.gain(hit.det_id)) {
        for a in amplitudes.iter_mut().filter(|a| **a < STRIP_SATURATION_254 as f64) {
            *a /= gain;
        }
    }
    amplitudes.iter().sum()
}

/// remove the lowest and highest fractions of a set of values, result sorted ascending
pub fn drop_fractions(mut values: Vec<f64>, low: f64, high: f64) -> Vec<f64> {
    values.sort_by_key(|&v| OrderedFloat(v));
    let n = values.len();
    let n_low = (n as f64 * low).floor() as usize;
    let n_high = (n as f64 * high).floor() as usize;
    if n_low + n_high >= n {
        return Vec::new();
    }
    values.truncate(n - n_high);
    values.drain(..n_low);
    values
}

/// harmonic-2 mean `(mean(x^-2))^-1/2` with a first order uncertainty
pub fn harmonic2(values: &[f64]) -> Option<DeDxMeasurement> {
    let inv: Vec<f64> = values.iter().filter(|&&x| x > 0.0).map(|&x| 1.0 / (x * x)).collect();
    if inv.is_empty() {
        return None;
    }
    let n = inv.len() as f64;
    let mean = inv.iter().sum::<f64>() / n;
    let value = mean.powf(-0.5);

    let error = if inv.len() > 1 {
        let var = inv.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0);
        0.5 * mean.powf(-1.5) * (var / n).sqrt()
    } else {
        0.0
    };

    Some(DeDxMeasurement {
        value,
        error,
        n_measurements: inv.len(),
    })
}

/// Smirnov-Cramer-von Mises discriminant of a set of per-hit probabilities
///
/// Arguments:
///
/// * `sorted_probs` - probabilities sorted ascending
///
/// Returns:
///
/// * `f64` - `3/n * (1/(12n) + sum_i p_i (p_i - (2i-1)/(2n)))`
pub fn ias_discriminant(sorted_probs: &[f64]) -> f64 {
    let n = sorted_probs.len() as f64;
    let sum: f64 = sorted_probs
        .iter()
        .enumerate()
        .map(|(i, &p)| p * (p - (2.0 * (i as f64 + 1.0) - 1.0) / (2.0 * n)))
        .sum();
    3.0 / n * (1.0 / (12.0 * n) + sum)
}

/// fraction of strip clusters with a MIP-like deposit
///
/// Arguments:
///
/// * `hits` - hits of the track
/// * `threshold` - dE/dx threshold in MeV/cm
///
/// Returns:
///
/// * `Option<f64>` - strip clusters below threshold over all hits, `None` without hits
pub fn fraction_of_mip(hits: &HitCollection, threshold: f64) -> Option<f64> {
    if hits.is_empty() {
        return None;
    }
    let below = hits
        .strip_hits()
        .filter(|h| h.path_length > 0.0 && h.charge * STRIP_CHARGE_TO_ENERGY / h.path_length < threshold)
        .count();
    Some(below as f64 / hits.len() as f64)
}

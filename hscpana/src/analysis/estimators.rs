//! The dE/dx estimator variants evaluated on every candidate track.

use serde::{Deserialize, Serialize};

use hscpcore::dedx::config::EstimatorConfig;
use hscpcore::dedx::estimator::{compute_dedx, fraction_of_mip, DeDxContext, DeDxMeasurement};
use hscpcore::dedx::probability::PixelProbabilities;
use hscpcore::detector::hit::HitCollection;

use crate::analysis::mode::AnalysisMode;

/// Estimator configurations of a run, built once at startup.
#[derive(Clone, Debug)]
pub struct EstimatorSuite {
    pub ias: EstimatorConfig,
    pub ih: EstimatorConfig,
    pub ih_up: EstimatorConfig,
    pub ih_down: EstimatorConfig,
    pub ih_no_l1: EstimatorConfig,
    pub ih_15drop: EstimatorConfig,
    pub ih_strip_only: EstimatorConfig,
    pub ih_strip_only_15drop: EstimatorConfig,
    pub ih_saturation_from_fits: EstimatorConfig,
    pub prob_q_dedx: EstimatorConfig,
    pub ias_no_inner_strips: EstimatorConfig,
    pub ias_pixel_only: EstimatorConfig,
    pub fmip_threshold: f64,
}

impl EstimatorSuite {
    pub fn for_mode(mode: AnalysisMode, use_template_layer: bool, fmip_threshold: f64) -> Self {
        let cleaning = mode.uses_cluster_cleaning();
        let prep = |cfg: EstimatorConfig| cfg.with_cluster_cleaning(cleaning).with_template_layer(use_template_layer);

        EstimatorSuite {
            ias: prep(EstimatorConfig::ias(mode.reverse_probability())),
            ih: prep(EstimatorConfig::ih()),
            ih_up: prep(EstimatorConfig::ih_up()),
            ih_down: prep(EstimatorConfig::ih_down()),
            ih_no_l1: prep(EstimatorConfig::ih_no_l1()),
            ih_15drop: prep(EstimatorConfig::ih_15drop()),
            ih_strip_only: prep(EstimatorConfig::ih_strip_only()),
            ih_strip_only_15drop: prep(EstimatorConfig::ih_strip_only_15drop()),
            ih_saturation_from_fits: prep(EstimatorConfig::ih_saturation_from_fits()),
            prob_q_dedx: prep(EstimatorConfig::prob_q_dedx()),
            ias_no_inner_strips: prep(EstimatorConfig::ias_no_inner_strips()),
            ias_pixel_only: prep(EstimatorConfig::ias_pixel_only()),
            fmip_threshold,
        }
    }

    /// Evaluate every variant on one hit collection.
    ///
    /// `particle_id` selects particle specific templates for the template
    /// based variants, 0 for the generic set.
    pub fn evaluate(&self, hits: &HitCollection, ctx: &DeDxContext, particle_id: u32) -> TrackEstimators {
        let templated = |cfg: &EstimatorConfig| {
            if particle_id == 0 || cfg.particle_id == particle_id {
                compute_dedx(hits, ctx, cfg)
            } else {
                compute_dedx(hits, ctx, &cfg.clone().with_particle_id(particle_id))
            }
        };

        TrackEstimators {
            ias: templated(&self.ias),
            ih: compute_dedx(hits, ctx, &self.ih),
            ih_up: compute_dedx(hits, ctx, &self.ih_up),
            ih_down: compute_dedx(hits, ctx, &self.ih_down),
            ih_no_l1: compute_dedx(hits, ctx, &self.ih_no_l1),
            ih_15drop: compute_dedx(hits, ctx, &self.ih_15drop),
            ih_strip_only: compute_dedx(hits, ctx, &self.ih_strip_only),
            ih_strip_only_15drop: compute_dedx(hits, ctx, &self.ih_strip_only_15drop),
            ih_saturation_from_fits: compute_dedx(hits, ctx, &self.ih_saturation_from_fits),
            prob_q_dedx: templated(&self.prob_q_dedx),
            ias_no_inner_strips: templated(&self.ias_no_inner_strips),
            ias_pixel_only: templated(&self.ias_pixel_only),
            fmip: fraction_of_mip(hits, self.fmip_threshold),
            pixel: PixelProbabilities::from_hits(hits),
        }
    }
}

/// Estimator values of one track, `None` where a variant has no measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackEstimators {
    pub ias: Option<DeDxMeasurement>,
    pub ih: Option<DeDxMeasurement>,
    pub ih_up: Option<DeDxMeasurement>,
    pub ih_down: Option<DeDxMeasurement>,
    pub ih_no_l1: Option<DeDxMeasurement>,
    pub ih_15drop: Option<DeDxMeasurement>,
    pub ih_strip_only: Option<DeDxMeasurement>,
    pub ih_strip_only_15drop: Option<DeDxMeasurement>,
    pub ih_saturation_from_fits: Option<DeDxMeasurement>,
    pub prob_q_dedx: Option<DeDxMeasurement>,
    pub ias_no_inner_strips: Option<DeDxMeasurement>,
    pub ias_pixel_only: Option<DeDxMeasurement>,
    pub fmip: Option<f64>,
    pub pixel: PixelProbabilities,
}

impl TrackEstimators {
    pub fn is_value(&self) -> Option<f64> {
        self.ias.map(|m| m.value)
    }

    pub fn ih_value(&self) -> Option<f64> {
        self.ih.map(|m| m.value)
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use regex::Regex;
use serde::{Deserialize, Serialize};

use hscpcore::dedx::calibration::ScaleFactors;
use hscpcore::physics::mass::BetheBlochParams;

use crate::analysis::cuts::PreselectionCuts;
use crate::analysis::mode::AnalysisMode;
use crate::analysis::systematics::SystematicShifts;
use crate::error::{AnalysisError, Result};

/// Origin of the processed events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Data,
    Background,
    Signal,
}

impl SampleType {
    pub fn is_mc(&self) -> bool {
        !matches!(self, SampleType::Data)
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, SampleType::Signal)
    }
}

/// Run configuration, loaded once and read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub mode: AnalysisMode,
    pub sample: SampleType,
    pub cuts: PreselectionCuts,
    pub bethe_bloch: BetheBlochParams,
    pub scale_factors: ScaleFactors,

    // strip clusters below this dE/dx count as MIP-like
    pub fmip_threshold: f64,
    pub eta_min: f64,
    pub eta_max: f64,

    // regex patterns matched against fired trigger names
    pub trigger_mu: Vec<String>,
    pub trigger_met: Vec<String>,

    pub shifts: SystematicShifts,
    pub seed: u64,

    pub template_path: Option<PathBuf>,
    pub gains_path: Option<PathBuf>,
    pub use_template_layer: bool,

    // 0 quiet .. 5 everything
    pub debug_level: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            mode: AnalysisMode::TrackerOnly,
            sample: SampleType::Data,
            cuts: PreselectionCuts::default(),
            bethe_bloch: BetheBlochParams::default(),
            scale_factors: ScaleFactors::default(),
            fmip_threshold: 4.0,
            eta_min: 0.0,
            eta_max: 2.1,
            trigger_mu: vec!["^HLT_Mu50_v".to_string()],
            trigger_met: vec![
                "^HLT_PFMET120_PFMHT120_IDTight_v".to_string(),
                "^HLT_PFHT500_PFMET100_PFMHT100_IDTight_v".to_string(),
                "^HLT_PFMETNoMu120_PFMHTNoMu120_IDTight_PFHT60_v".to_string(),
                "^HLT_MET105_IsoTrk50_v".to_string(),
            ],
            shifts: SystematicShifts::default(),
            seed: 42,
            template_path: None,
            gains_path: None,
            use_template_layer: false,
            debug_level: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn new(mode: AnalysisMode, sample: SampleType) -> Self {
        AnalysisConfig { mode, sample, ..Default::default() }
    }

    /// Read a JSON configuration and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let f = BufReader::new(File::open(path)?);
        let config: AnalysisConfig = serde_json::from_reader(f)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cuts.validate()?;

        if !(self.eta_min >= 0.0 && self.eta_min < self.eta_max) {
            return Err(AnalysisError::Config(format!(
                "eta window [{}, {}] is empty",
                self.eta_min, self.eta_max
            )));
        }
        if self.bethe_bloch.k <= 0.0 {
            return Err(AnalysisError::Config("Bethe-Bloch K must be positive".to_string()));
        }
        if self.scale_factors.pixel <= 0.0 || self.scale_factors.strip <= 0.0 {
            return Err(AnalysisError::Config("dE/dx scale factors must be positive".to_string()));
        }
        if self.fmip_threshold <= 0.0 {
            return Err(AnalysisError::Config("fmip_threshold must be positive".to_string()));
        }
        if self.debug_level > 5 {
            return Err(AnalysisError::Config(format!("debug_level {} out of 0..=5", self.debug_level)));
        }
        if self.trigger_mu.is_empty() && self.trigger_met.is_empty() {
            return Err(AnalysisError::Config("no trigger pattern configured".to_string()));
        }
        self.trigger_regexes()?;
        Ok(())
    }

    /// Compiled muon and MET trigger patterns.
    pub fn trigger_regexes(&self) -> Result<(Vec<Regex>, Vec<Regex>)> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| AnalysisError::Config(format!("trigger pattern {p}: {e}"))))
                .collect()
        };
        Ok((compile(&self.trigger_mu)?, compile(&self.trigger_met)?))
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.debug_level {
            0 => LevelFilter::Warn,
            1 | 2 => LevelFilter::Info,
            3 | 4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        AnalysisConfig::default().validate().unwrap();
        let cfg = AnalysisConfig::new(AnalysisMode::TofOnly, SampleType::Signal);
        assert!(cfg.sample.is_mc() && cfg.sample.is_signal());
        assert!(!SampleType::Data.is_mc());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{"mode": "tof_only", "sample": "background", "cuts": {"min_pt": 70.0}, "debug_level": 4}"#;
        let cfg: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.mode, AnalysisMode::TofOnly);
        assert_eq!(cfg.sample, SampleType::Background);
        assert_eq!(cfg.cuts.min_pt, 70.0);
        assert_eq!(cfg.cuts.max_dz, PreselectionCuts::default().max_dz);
        assert_eq!(cfg.log_level(), LevelFilter::Debug);
        assert_eq!(cfg.trigger_mu, AnalysisConfig::default().trigger_mu);
    }

    #[test]
    fn test_validate_rejects() {
        let cfg = AnalysisConfig { eta_min: 2.5, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(AnalysisError::Config(_))));

        let cfg = AnalysisConfig { trigger_mu: vec!["HLT_(".to_string()], ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = AnalysisConfig { debug_level: 9, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mode": "multiply_charged", "eta_max": 1.5}"#).unwrap();
        let cfg = AnalysisConfig::load(&path).unwrap();
        assert_eq!(cfg.mode, AnalysisMode::MultiplyCharged);
        assert_eq!(cfg.eta_max, 1.5);

        std::fs::write(&path, r#"{"eta_min": 1.0, "eta_max": 0.5}"#).unwrap();
        assert!(AnalysisConfig::load(&path).is_err());
    }
}

// src/lib.rs
pub mod error;
pub mod config;
pub mod driver;

pub mod analysis {
    pub mod mode;
    pub mod cuts;
    pub mod estimators;
    pub mod preselection;
    pub mod selection;
    pub mod accumulator;
    pub mod systematics;
}

pub mod event {
    pub mod geometry;
    pub mod candidate;
    pub mod record;
    #[cfg(test)]
    pub(crate) mod fixtures;
}

pub mod output {
    pub mod histogram;
    pub mod ntuple;
    pub mod io;
}

// Re-export commonly used types
pub use analysis::mode::AnalysisMode;
pub use config::AnalysisConfig;
pub use driver::Analyzer;
pub use error::{AnalysisError, Result};

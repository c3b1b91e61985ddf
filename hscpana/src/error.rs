use thiserror::Error;

use hscpcore::dedx::calibration::CalibrationError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("corrupt input in event {event}: {reason}")]
    CorruptInput { event: u64, reason: String },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

// physics module
pub mod physics {
    pub mod constants;
    pub mod mass;
}

// detector module
pub mod detector {
    pub mod hit;
}

// dedx module
pub mod dedx {
    pub mod calibration;
    pub mod config;
    pub mod estimator;
    pub mod probability;
    pub mod strips;
}

// Purpose: constants shared by the dE/dx estimators and the mass reconstruction
pub const ELECTRON_PAIR_ENERGY: f64 = 3.61e-6; // MeV per collected electron in silicon
pub const ADC_TO_ELECTRONS: f64 = 247.0; // strip ADC count to electrons
pub const STRIP_CHARGE_TO_ENERGY: f64 = ELECTRON_PAIR_ENERGY * ADC_TO_ELECTRONS; // MeV per ADC count

// Strip readout saturation
pub const STRIP_SATURATION_254: u16 = 254;
pub const STRIP_SATURATION_255: u16 = 255;

// Inter-strip cross talk, first and second neighbour fractions
pub const CROSS_TALK_X1: f64 = 0.10;
pub const CROSS_TALK_X2: f64 = 0.04;

// Inverted strip amplitudes below this are zeroed (ADC)
pub const CROSS_TALK_THRESHOLD: f64 = 20.0;
// Cluster sizes (strips) the inversion is applied to
pub const CROSS_TALK_MIN_STRIPS: usize = 2;
pub const CROSS_TALK_MAX_STRIPS: usize = 8;
// Minimum neighbour amplitude for recovering a saturated strip (ADC)
pub const SATURATION_NEIGHBOUR_MIN: f64 = 25.0;

// Bethe-Bloch parametrization uncertainties
pub const DEDX_K_ERROR: f64 = 0.2;
pub const DEDX_C_ERROR: f64 = 0.4;

// Fraction of low or high dE/dx values removed by the "15% drop" estimators
pub const DROP_FRACTION_15: f64 = 0.15;

// Upper bound on strip measurements used per track, effectively unlimited
pub const MAX_STRIP_MEASUREMENTS: usize = 99;

use serde::{Deserialize, Serialize};

use crate::physics::constants::{DEDX_C_ERROR, DEDX_K_ERROR};

/// Parameters of the dE/dx to mass relation `Ih = K * m^2 / p^2 + C`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BetheBlochParams {
    pub k: f64,
    pub c: f64,
}

impl Default for BetheBlochParams {
    fn default() -> Self {
        BetheBlochParams { k: 2.30, c: 3.17 }
    }
}

impl BetheBlochParams {
    pub fn new(k: f64, c: f64) -> Self {
        BetheBlochParams { k, c }
    }
}

/// reduced ionization above the pedestal, `(Ih - C) / K`
///
/// Arguments:
///
/// * `ih` - harmonic dE/dx estimator value in MeV/cm
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `f64` - the reduced ionization, negative when `ih` is below the pedestal
pub fn reduced_ionization(ih: f64, params: &BetheBlochParams) -> f64 {
    (ih - params.c) / params.k
}

/// calculate the mass of a candidate from its momentum and ionization
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `ih` - harmonic dE/dx estimator value in MeV/cm
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `Option<f64>` - mass in GeV, `None` if `ih` lies below the pedestal `C`
///
/// # Examples
///
/// ```
/// use hscpcore::physics::mass::{mass_from_ionization, BetheBlochParams};
///
/// let params = BetheBlochParams::new(2.0, 3.0);
/// let mass = mass_from_ionization(100.0, 5.0, &params).unwrap();
/// assert!((mass - 100.0).abs() < 1e-9);
/// assert!(mass_from_ionization(100.0, 2.5, &params).is_none());
/// ```
pub fn mass_from_ionization(p: f64, ih: f64, params: &BetheBlochParams) -> Option<f64> {
    if ih < params.c {
        return None;
    }
    let mass = reduced_ionization(ih, params).sqrt() * p;
    mass.is_finite().then_some(mass)
}

/// calculate the velocity implied by an ionization measurement
///
/// Arguments:
///
/// * `ih` - harmonic dE/dx estimator value in MeV/cm
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `Option<f64>` - beta, `None` if `ih` lies below the pedestal `C`
pub fn beta_from_ionization(ih: f64, params: &BetheBlochParams) -> Option<f64> {
    if ih < params.c {
        return None;
    }
    Some(1.0 / (1.0 + reduced_ionization(ih, params)).sqrt())
}

/// calculate the ionization expected for a particle of given momentum and mass
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `mass` - mass in GeV
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `f64` - expected Ih in MeV/cm
pub fn ionization_from_mass(p: f64, mass: f64, params: &BetheBlochParams) -> f64 {
    params.k * (mass * mass) / (p * p) + params.c
}

/// calculate the mass of a candidate from its momentum and time-of-flight
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `inverse_beta` - measured 1/beta
///
/// Returns:
///
/// * `Option<f64>` - mass in GeV, `None` if `inverse_beta < 1`
pub fn mass_from_tof(p: f64, inverse_beta: f64) -> Option<f64> {
    let arg = inverse_beta * inverse_beta - 1.0;
    if arg < 0.0 || !arg.is_finite() {
        return None;
    }
    Some(p * arg.sqrt())
}

/// calculate the mass of a candidate from its momentum and velocity
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `beta` - velocity as a fraction of the speed of light
///
/// Returns:
///
/// * `Option<f64>` - mass in GeV, `None` if beta is not in `(0, 1]`
pub fn mass_from_beta(p: f64, beta: f64) -> Option<f64> {
    if beta <= 0.0 {
        return None;
    }
    let arg = 1.0 / (beta * beta) - 1.0;
    if arg < 0.0 || !arg.is_finite() {
        return None;
    }
    Some(p * arg.sqrt())
}

/// combined mass from ionization and time-of-flight
///
/// The two velocity estimates are averaged before converting to a mass.
/// With only one measurement present that one is used alone.
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `ih` - optional harmonic dE/dx estimator value
/// * `inverse_beta` - optional time-of-flight 1/beta
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `Option<f64>` - mass in GeV
pub fn combined_mass(p: f64, ih: Option<f64>, inverse_beta: Option<f64>, params: &BetheBlochParams) -> Option<f64> {
    match (ih, inverse_beta) {
        (Some(ih), Some(inv_beta)) => {
            let beta_ih = beta_from_ionization(ih, params)?;
            if inv_beta == 0.0 {
                return None;
            }
            mass_from_beta(p, 0.5 * (beta_ih + 1.0 / inv_beta))
        }
        (Some(ih), None) => mass_from_ionization(p, ih, params),
        (None, Some(inv_beta)) => mass_from_tof(p, inv_beta),
        (None, None) => None,
    }
}

/// relative mass uncertainty from first order error propagation
///
/// Arguments:
///
/// * `p` - momentum in GeV
/// * `p_err` - momentum uncertainty in GeV
/// * `ih` - harmonic dE/dx estimator value
/// * `ih_err` - uncertainty on `ih`
/// * `mass` - reconstructed mass in GeV
/// * `params` - Bethe-Bloch parameters
///
/// Returns:
///
/// * `Option<f64>` - relative uncertainty `sigma_m / m`, `None` for an undefined mass or a non finite result
pub fn mass_uncertainty(p: f64, p_err: f64, ih: f64, ih_err: f64, mass: f64, params: &BetheBlochParams) -> Option<f64> {
    if mass < 0.0 || !ih.is_finite() {
        return None;
    }
    let k = params.k;
    let fac1 = p * p / (2.0 * mass * k);
    let fac2 = (2.0 * mass * mass * k / (p * p)).powi(2);
    let mass_err = fac1
        * (fac2 * (p_err / p).powi(2)
            + fac2 * (DEDX_K_ERROR / k).powi(2)
            + ih_err.powi(2)
            + DEDX_C_ERROR.powi(2))
        .sqrt();

    let relative = mass_err / mass;
    relative.is_finite().then_some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mass_round_trip_through_ionization() {
        let params = BetheBlochParams::default();
        for &(p, mass) in &[(120.0, 500.0), (300.0, 1200.0), (55.0, 100.0)] {
            let ih = ionization_from_mass(p, mass, &params);
            let recovered = mass_from_ionization(p, ih, &params).unwrap();
            assert_relative_eq!(recovered, mass, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_mass_below_pedestal_is_undefined() {
        let params = BetheBlochParams::default();
        assert!(mass_from_ionization(100.0, params.c - 0.01, &params).is_none());
        assert!(beta_from_ionization(params.c - 0.01, &params).is_none());
        // exactly at the pedestal is a massless particle
        assert_eq!(mass_from_ionization(100.0, params.c, &params), Some(0.0));
    }

    #[test]
    fn test_tof_mass_domain() {
        assert!(mass_from_tof(100.0, 0.9).is_none());
        assert_eq!(mass_from_tof(100.0, 1.0), Some(0.0));
        let m = mass_from_tof(100.0, 1.25).unwrap();
        assert!((m - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_mass_from_beta_matches_tof() {
        let beta = 0.8;
        let a = mass_from_beta(200.0, beta).unwrap();
        let b = mass_from_tof(200.0, 1.0 / beta).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-12);
        assert!(mass_from_beta(200.0, 0.0).is_none());
        assert!(mass_from_beta(200.0, 1.2).is_none());
    }

    #[test]
    fn test_combined_mass_averages_betas() {
        let params = BetheBlochParams::new(2.0, 3.0);
        let p = 100.0;
        // ih = 5 gives (ih - c) / k = 1, beta = 1 / sqrt(2)
        let beta_ih = 1.0 / 2f64.sqrt();
        let inv_beta = 1.25;
        let expected = mass_from_beta(p, 0.5 * (beta_ih + 1.0 / inv_beta)).unwrap();
        let got = combined_mass(p, Some(5.0), Some(inv_beta), &params).unwrap();
        assert_relative_eq!(got, expected, max_relative = 1e-12);

        // averaging the two masses would give something different
        let mass_avg = 0.5
            * (mass_from_ionization(p, 5.0, &params).unwrap() + mass_from_tof(p, inv_beta).unwrap());
        assert!((got - mass_avg).abs() > 0.1);
    }

    #[test]
    fn test_combined_mass_single_measurement() {
        let params = BetheBlochParams::default();
        assert_eq!(
            combined_mass(100.0, None, Some(1.25), &params),
            mass_from_tof(100.0, 1.25)
        );
        assert_eq!(
            combined_mass(100.0, Some(4.2), None, &params),
            mass_from_ionization(100.0, 4.2, &params)
        );
        assert!(combined_mass(100.0, None, None, &params).is_none());
    }

    #[test]
    fn test_mass_uncertainty() {
        let params = BetheBlochParams::default();
        assert!(mass_uncertainty(100.0, 1.0, 4.0, 0.1, -1.0, &params).is_none());
        let rel = mass_uncertainty(100.0, 1.0, 4.0, 0.1, 50.0, &params).unwrap();
        assert!(rel > 0.0 && rel.is_finite());
        // a zero mass blows the propagation up
        assert!(mass_uncertainty(100.0, 1.0, 4.0, 0.1, 0.0, &params).is_none());
    }
}

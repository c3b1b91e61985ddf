use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// transverse distance from the beam line
    pub fn rho(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
}

impl Momentum {
    pub fn new(px: f64, py: f64, pz: f64) -> Self {
        Momentum { px, py, pz }
    }

    /// Build from transverse momentum, pseudorapidity and azimuth.
    pub fn from_pt_eta_phi(pt: f64, eta: f64, phi: f64) -> Self {
        Momentum {
            px: pt * phi.cos(),
            py: pt * phi.sin(),
            pz: pt * eta.sinh(),
        }
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return if self.pz >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
        }
        (self.pz / pt).asinh()
    }

    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }
}

/// wrap an angle difference into `(-pi, pi]`
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut d = phi1 - phi2;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d <= -PI {
        d += 2.0 * PI;
    }
    d
}

pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pt_eta_phi_round_trip() {
        let m = Momentum::from_pt_eta_phi(120.0, -1.3, 2.0);
        assert!((m.pt() - 120.0).abs() < 1e-9);
        assert!((m.eta() + 1.3).abs() < 1e-9);
        assert!((m.phi() - 2.0).abs() < 1e-9);
        assert!((m.p() - 120.0 * (1.3f64).cosh()).abs() < 1e-9);
    }

    #[test]
    fn test_delta_phi_wraps() {
        assert!((delta_phi(3.0, -3.0) - (6.0 - 2.0 * PI)).abs() < 1e-12);
        assert!((delta_phi(PI, -PI)).abs() < 1e-12);
        assert!((delta_r(0.0, 0.1, 0.3, -0.3) - 0.5).abs() < 1e-12);
    }
}

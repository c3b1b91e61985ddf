use serde::{Deserialize, Serialize};

use hscpcore::detector::hit::HitCollection;

use crate::event::geometry::{Momentum, Point3};

/// Reconstructed object an HSCP candidate was built from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateType {
    InnerTrack,
    TrackerMuon,
    GlobalMuon,
    StandaloneMuon,
    MatchedStandaloneMuon,
}

/// Hit pattern and fit quality of a track
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackQuality {
    pub chi2: f64,
    pub ndof: f64,
    // valid hits
    pub found: u32,
    pub valid_pixel_hits: u32,
    pub valid_fraction: f64,
    // layers without measurement before the first and between hits
    pub missing_inner_layers: u32,
    pub missing_track_layers: u32,
    pub high_purity: bool,
    pub muon_stations: u32,
}

impl TrackQuality {
    pub fn chi2_per_ndof(&self) -> f64 {
        self.chi2 / self.ndof
    }

    pub fn missing_till_last(&self) -> u32 {
        self.missing_inner_layers + self.missing_track_layers
    }

    /// Valid hit fraction counting missing layers up to the last hit, -1 without hits.
    pub fn valid_fraction_till_last(&self) -> f64 {
        if self.found == 0 {
            return -1.0;
        }
        self.found as f64 / (self.found + self.missing_till_last()) as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub momentum: Momentum,
    pub charge: i32,
    pub pt_error: f64,
    // point of closest approach used as track reference
    pub reference: Point3,
    pub quality: TrackQuality,
}

impl Track {
    pub fn pt(&self) -> f64 {
        self.momentum.pt()
    }

    pub fn p(&self) -> f64 {
        self.momentum.p()
    }

    pub fn eta(&self) -> f64 {
        self.momentum.eta()
    }

    pub fn phi(&self) -> f64 {
        self.momentum.phi()
    }

    /// transverse impact parameter with respect to `point`
    pub fn dxy(&self, point: &Point3) -> f64 {
        let m = &self.momentum;
        (-(self.reference.x - point.x) * m.py + (self.reference.y - point.y) * m.px) / m.pt()
    }

    /// longitudinal impact parameter with respect to `point`
    pub fn dz(&self, point: &Point3) -> f64 {
        let m = &self.momentum;
        let pt = m.pt();
        (self.reference.z - point.z)
            - ((self.reference.x - point.x) * m.px + (self.reference.y - point.y) * m.py) / pt * (m.pz / pt)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3,
    pub ndof: f64,
    #[serde(default)]
    pub is_fake: bool,
}

impl Vertex {
    /// Non-fake, |z| <= 24 cm, rho <= 2 cm and more than 4 degrees of freedom.
    pub fn is_good(&self) -> bool {
        !self.is_fake && self.position.z.abs() <= 24.0 && self.position.rho() <= 2.0 && self.ndof > 4.0
    }
}

/// One muon system timing fit
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MuonTime {
    pub inverse_beta: f64,
    pub inverse_beta_err: f64,
    pub ndof: u32,
    #[serde(default)]
    pub time_at_ip_in_out: f64,
}

/// Combined, drift tube and cathode strip chamber timing of a candidate
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfFlight {
    pub combined: MuonTime,
    pub dt: MuonTime,
    pub csc: MuonTime,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Muon {
    pub is_global: bool,
    pub is_tracker: bool,
    pub is_standalone: bool,
    pub standalone_track: Option<Track>,
}

/// Isolation sums in a cone around the track
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Isolation {
    pub tk_sum_et: f64,
    pub ecal_energy: f64,
    pub hcal_energy: f64,
}

/// Generator particle matched to a signal candidate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenMatch {
    pub pdg_id: i32,
    pub beta: f64,
    pub pt: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HscpCandidate {
    pub kind: CandidateType,
    pub track: Option<Track>,
    #[serde(default)]
    pub muon: Option<Muon>,
    #[serde(default)]
    pub hits: Option<HitCollection>,
    #[serde(default)]
    pub tof: Option<TimeOfFlight>,
    #[serde(default)]
    pub isolation: Option<Isolation>,
    #[serde(default)]
    pub gen: Option<GenMatch>,
}

impl HscpCandidate {
    /// Inner track, or the standalone muon track when `standalone` is set.
    pub fn resolve_track(&self, standalone: bool) -> Option<&Track> {
        if standalone {
            self.muon.as_ref()?.standalone_track.as_ref()
        } else {
            self.track.as_ref()
        }
    }
}

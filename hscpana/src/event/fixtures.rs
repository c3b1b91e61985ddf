//! Synthetic events shared by the unit tests.

use hscpcore::dedx::estimator::DeDxMeasurement;
use hscpcore::dedx::probability::PixelProbabilities;

use crate::analysis::estimators::TrackEstimators;
use crate::event::candidate::{
    CandidateType, HscpCandidate, Isolation, Muon, MuonTime, TimeOfFlight, Track, TrackQuality, Vertex,
};
use crate::event::geometry::{Momentum, Point3};
use crate::event::record::EventRecord;

/// A well measured track from the origin.
pub(crate) fn good_track(pt: f64, eta: f64, phi: f64) -> Track {
    Track {
        momentum: Momentum::from_pt_eta_phi(pt, eta, phi),
        charge: 1,
        pt_error: 0.05 * pt,
        reference: Point3::default(),
        quality: TrackQuality {
            chi2: 10.0,
            ndof: 10.0,
            found: 15,
            valid_pixel_hits: 3,
            valid_fraction: 1.0,
            missing_inner_layers: 0,
            missing_track_layers: 0,
            high_purity: true,
            muon_stations: 3,
        },
    }
}

/// Global muon candidate with an isolated inner track and no timing.
pub(crate) fn tracker_candidate(track: Track) -> HscpCandidate {
    HscpCandidate {
        kind: CandidateType::GlobalMuon,
        muon: Some(Muon {
            is_global: true,
            is_tracker: true,
            is_standalone: true,
            standalone_track: Some(track.clone()),
        }),
        track: Some(track),
        hits: None,
        tof: None,
        isolation: Some(Isolation::default()),
        gen: None,
    }
}

pub(crate) fn muon_time(inverse_beta: f64, time_at_ip: f64) -> MuonTime {
    MuonTime {
        inverse_beta,
        inverse_beta_err: 0.05,
        ndof: 10,
        time_at_ip_in_out: time_at_ip,
    }
}

pub(crate) fn timing(inverse_beta: f64) -> TimeOfFlight {
    let t = muon_time(inverse_beta, 0.0);
    TimeOfFlight { combined: t, dt: t, csc: t }
}

/// Standalone muon candidate with a slow time-of-flight measurement.
pub(crate) fn standalone_candidate(track: Track, time_at_ip: f64) -> HscpCandidate {
    let t = muon_time(1.2, time_at_ip);
    HscpCandidate {
        kind: CandidateType::StandaloneMuon,
        track: None,
        muon: Some(Muon {
            is_global: false,
            is_tracker: false,
            is_standalone: true,
            standalone_track: Some(track),
        }),
        hits: None,
        tof: Some(TimeOfFlight { combined: t, dt: t, csc: t }),
        isolation: None,
        gen: None,
    }
}

/// Event with one good vertex at the origin.
pub(crate) fn event_with(candidates: Vec<HscpCandidate>) -> EventRecord {
    let mut event = EventRecord::new(1, 1, 1);
    event.vertices.push(Vertex {
        position: Point3::default(),
        ndof: 10.0,
        is_fake: false,
    });
    event.candidates = candidates;
    event
}

pub(crate) fn track_mut(event: &mut EventRecord) -> &mut Track {
    event.candidates[0].track.as_mut().unwrap()
}

pub(crate) fn set_track(event: &mut EventRecord, track: Track) {
    event.candidates[0].track = Some(track);
}

fn measurement(value: f64, n: usize) -> Option<DeDxMeasurement> {
    Some(DeDxMeasurement {
        value,
        error: 0.1,
        n_measurements: n,
    })
}

/// Estimators with the given Is and Ih, everything else plausible.
pub(crate) fn estimators(is: f64, ih: f64) -> TrackEstimators {
    TrackEstimators {
        ias: measurement(is, 12),
        ih: measurement(ih, 12),
        ih_up: measurement(ih * 1.05, 10),
        ih_down: measurement(ih * 0.95, 10),
        ih_no_l1: measurement(ih, 11),
        ih_15drop: measurement(ih, 10),
        ih_strip_only: measurement(ih, 9),
        ih_strip_only_15drop: measurement(ih, 8),
        ih_saturation_from_fits: measurement(ih, 12),
        prob_q_dedx: measurement(0.4, 3),
        ias_no_inner_strips: measurement(is, 6),
        ias_pixel_only: measurement(is, 3),
        fmip: Some(0.1),
        pixel: PixelProbabilities {
            prob_q: 0.3,
            prob_xy: 0.4,
            prob_q_no_l1: 0.3,
            prob_xy_no_l1: 0.4,
            n_hits: 3,
            n_hits_no_l1: 2,
        },
    }
}

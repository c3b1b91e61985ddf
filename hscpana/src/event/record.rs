use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::event::candidate::{HscpCandidate, Track, Vertex};
use crate::event::geometry::{delta_phi, delta_r, Point3};

/// Reconstructed muon chamber segment position
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuonSegment {
    pub eta: f64,
    pub phi: f64,
}

/// Everything the analysis reads from one collision event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub run: u32,
    pub lumi: u32,
    pub event: u64,
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub beam_spot: Point3,
    #[serde(default)]
    pub candidates: Vec<HscpCandidate>,
    #[serde(default)]
    pub segments: Vec<MuonSegment>,
    // standalone muon tracks refitted without the vertex constraint
    #[serde(default)]
    pub refitted_standalone: Vec<Track>,
    #[serde(default)]
    pub fired_triggers: Vec<String>,
    #[serde(default = "unit_weight")]
    pub pileup_weight: f64,
    #[serde(default = "unit_weight")]
    pub pileup_syst_factor: f64,
}

fn unit_weight() -> f64 {
    1.0
}

/// Vertex a track is compared against
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceVertex {
    pub index: usize,
    pub n_good: usize,
}

/// Closest approach of a flipped track to the muon segments of the event
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentSeparation {
    pub min_dr: f64,
    pub min_eta: f64,
    pub min_phi: f64,
}

impl Default for SegmentSeparation {
    fn default() -> Self {
        SegmentSeparation { min_dr: 10.0, min_eta: 10.0, min_phi: 10.0 }
    }
}

// segments closer than this in phi to the flipped track belong to the track itself
const OWN_SEGMENT_PHI_MARGIN: f64 = 0.5;

// opening angle of a candidate without partner tracks
const NO_PARTNER_OPEN_ANGLE: f64 = -0.1;

impl EventRecord {
    pub fn new(run: u32, lumi: u32, event: u64) -> Self {
        EventRecord {
            run,
            lumi,
            event,
            vertices: Vec::new(),
            beam_spot: Point3::default(),
            candidates: Vec::new(),
            segments: Vec::new(),
            refitted_standalone: Vec::new(),
            fired_triggers: Vec::new(),
            pileup_weight: 1.0,
            pileup_syst_factor: 1.0,
        }
    }

    /// Pick the good vertex closest in z to the track.
    ///
    /// Falls back to the first vertex when none is good, `None` for an
    /// event without vertices.
    pub fn reference_vertex(&self, track: &Track) -> Option<ReferenceVertex> {
        if self.vertices.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        let mut n_good = 0;
        for (i, v) in self.vertices.iter().enumerate() {
            if !v.is_good() {
                continue;
            }
            n_good += 1;
            let dz = track.dz(&v.position).abs();
            if best.map_or(true, |(_, d)| dz < d) {
                best = Some((i, dz));
            }
        }
        Some(ReferenceVertex {
            index: best.map_or(0, |(i, _)| i),
            n_good,
        })
    }

    /// Largest back-to-back angular distance to another candidate's track.
    ///
    /// The candidate is mirrored through the origin (eta to -eta, phi to
    /// phi + pi) so that a cosmic muon crossing the detector pairs up with
    /// its own second leg at small distance.
    pub fn opening_angle(&self, candidate_index: usize) -> f64 {
        let track = match self.candidates.get(candidate_index).and_then(|c| c.track.as_ref()) {
            Some(t) => t,
            None => return NO_PARTNER_OPEN_ANGLE,
        };
        let (eta, phi) = (-track.eta(), PI + track.phi());

        self.candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != candidate_index)
            .filter_map(|(_, c)| c.track.as_ref())
            .map(|other| delta_r(eta, phi, other.eta(), other.phi()))
            .fold(NO_PARTNER_OPEN_ANGLE, f64::max)
    }

    /// Distance of the mirrored track to the nearest muon segments.
    pub fn segment_separation(&self, track: &Track) -> SegmentSeparation {
        let eta_flip = -track.eta();
        let phi_flip = track.phi() + PI;
        let mut sep = SegmentSeparation::default();

        for seg in &self.segments {
            let deta = seg.eta - eta_flip;
            let dphi = delta_phi(seg.phi, phi_flip);

            if deta.abs() < sep.min_eta.abs() && dphi.abs() < PI - OWN_SEGMENT_PHI_MARGIN {
                sep.min_eta = deta;
            }
            if dphi.abs() < sep.min_phi.abs() {
                sep.min_phi = dphi;
            }
            sep.min_dr = sep.min_dr.min((deta * deta + dphi * dphi).sqrt());
        }
        sep
    }

    /// Refitted standalone track closest in (eta, phi), with its distance.
    pub fn nearest_no_vertex_track(&self, track: &Track) -> Option<(&Track, f64)> {
        let mut best: Option<(&Track, f64)> = None;
        for t in &self.refitted_standalone {
            let dr = delta_r(track.eta(), track.phi(), t.eta(), t.phi());
            if best.map_or(true, |(_, d)| dr < d) {
                best = Some((t, dr));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::candidate::{CandidateType, TrackQuality};
    use crate::event::geometry::Momentum;

    fn track(pt: f64, eta: f64, phi: f64, z: f64) -> Track {
        Track {
            momentum: Momentum::from_pt_eta_phi(pt, eta, phi),
            charge: 1,
            pt_error: 1.0,
            reference: Point3::new(0.0, 0.0, z),
            quality: TrackQuality::default(),
        }
    }

    fn vertex(z: f64, ndof: f64) -> Vertex {
        Vertex { position: Point3::new(0.0, 0.0, z), ndof, is_fake: false }
    }

    fn candidate(t: Track) -> HscpCandidate {
        HscpCandidate {
            kind: CandidateType::InnerTrack,
            track: Some(t),
            muon: None,
            hits: None,
            tof: None,
            isolation: None,
            gen: None,
        }
    }

    #[test]
    fn test_reference_vertex_closest_in_z() {
        let mut ev = EventRecord::new(1, 1, 1);
        let t = track(100.0, 0.0, 0.0, 5.0);
        assert!(ev.reference_vertex(&t).is_none());

        ev.vertices = vec![vertex(0.0, 10.0), vertex(4.8, 10.0), vertex(5.0, 2.0)];
        let rv = ev.reference_vertex(&t).unwrap();
        // the exact match fails the ndof requirement
        assert_eq!(rv.index, 1);
        assert_eq!(rv.n_good, 2);
    }

    #[test]
    fn test_reference_vertex_falls_back_to_first() {
        let mut ev = EventRecord::new(1, 1, 1);
        ev.vertices = vec![vertex(30.0, 10.0), vertex(0.0, 1.0)];
        let rv = ev.reference_vertex(&track(100.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(rv.index, 0);
        assert_eq!(rv.n_good, 0);
    }

    #[test]
    fn test_opening_angle() {
        let mut ev = EventRecord::new(1, 1, 1);
        ev.candidates.push(candidate(track(100.0, 0.5, 0.3, 0.0)));
        assert_eq!(ev.opening_angle(0), -0.1);

        // second leg of a cosmic: exactly back to back
        ev.candidates.push(candidate(track(100.0, -0.5, 0.3 - PI, 0.0)));
        assert!(ev.opening_angle(0).abs() < 1e-9);

        // a partner in the same direction is far from the mirrored track
        ev.candidates[1] = candidate(track(100.0, 0.5, 0.3, 0.0));
        assert!((ev.opening_angle(0) - (1.0f64 + PI * PI).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_segment_separation_skips_own_segments() {
        let mut ev = EventRecord::new(1, 1, 1);
        let t = track(100.0, 0.4, 1.0, 0.0);
        assert_eq!(ev.segment_separation(&t), SegmentSeparation::default());

        ev.segments = vec![
            // on the track itself, dphi is pi from the flipped direction
            MuonSegment { eta: 0.4, phi: 1.0 },
            // opposite side
            MuonSegment { eta: -0.35, phi: 1.0 - PI },
        ];
        let sep = ev.segment_separation(&t);
        assert!((sep.min_eta - 0.05).abs() < 1e-9);
        assert!(sep.min_phi.abs() < 1e-9);
        assert!((sep.min_dr - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_no_vertex_track() {
        let mut ev = EventRecord::new(1, 1, 1);
        let t = track(100.0, 0.0, 0.0, 0.0);
        assert!(ev.nearest_no_vertex_track(&t).is_none());
        ev.refitted_standalone = vec![track(90.0, 0.3, 0.0, 0.0), track(90.0, 0.1, 0.0, 0.0)];
        let (nearest, dr) = ev.nearest_no_vertex_track(&t).unwrap();
        assert!((dr - 0.1).abs() < 1e-9);
        assert!((nearest.eta() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_event_json_defaults() {
        let ev: EventRecord = serde_json::from_str(r#"{"run":1,"lumi":2,"event":3}"#).unwrap();
        assert_eq!(ev.pileup_weight, 1.0);
        assert!(ev.candidates.is_empty());
    }
}

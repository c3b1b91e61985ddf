use itertools::Itertools;
use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::physics::constants::{
    CROSS_TALK_MAX_STRIPS, CROSS_TALK_MIN_STRIPS, CROSS_TALK_THRESHOLD, CROSS_TALK_X1, CROSS_TALK_X2,
    SATURATION_NEIGHBOUR_MIN, STRIP_SATURATION_254,
};

fn is_saturated(a: f64) -> bool {
    a >= STRIP_SATURATION_254 as f64
}

/// undo inter-strip charge sharing on a strip cluster
///
/// Each strip leaks a fraction `x1` of its charge to each first neighbour and
/// `x2` to each second neighbour. The banded sharing matrix is inverted and
/// applied to the observed amplitudes. Clusters with a saturated strip, a single
/// strip or more than eight strips are returned unchanged. Inverted values below
/// a threshold are zeroed.
///
/// Arguments:
///
/// * `amplitudes` - raw ADC amplitudes in strip order
/// * `x1` - first neighbour cross talk fraction
/// * `x2` - second neighbour cross talk fraction
///
/// Returns:
///
/// * `Vec<f64>` - corrected amplitudes
pub fn cross_talk_inversion(amplitudes: &[u16], x1: f64, x2: f64) -> Vec<f64> {
    let observed: Vec<f64> = amplitudes.iter().map(|&a| a as f64).collect();
    let n = observed.len();
    if !(CROSS_TALK_MIN_STRIPS..=CROSS_TALK_MAX_STRIPS).contains(&n) || observed.iter().any(|&a| is_saturated(a)) {
        return observed;
    }

    let a = 1.0 - 2.0 * x1 - 2.0 * x2;
    let sharing = DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
        0 => a,
        1 => x1,
        2 => x2,
        _ => 0.0,
    });

    let inverse = match sharing.try_inverse() {
        Some(inv) => inv,
        None => {
            trace!("cross talk matrix of size {} not invertible, keeping raw amplitudes", n);
            return observed;
        }
    };

    let corrected = inverse * DVector::from_vec(observed);
    corrected
        .iter()
        .map(|&q| if q < CROSS_TALK_THRESHOLD { 0.0 } else { q.trunc() })
        .collect()
}

/// recover the charge of saturated strips from their neighbours
///
/// A saturated peak (one or two adjacent strips at or above 254) is replaced by
/// the charge implied by the first-neighbour cross talk seen on the flanks,
/// `(left + right) / (2 * x1)`, when both flanks are above a minimum amplitude.
/// The corrected value never goes below the saturation level.
///
/// Arguments:
///
/// * `amplitudes` - raw ADC amplitudes in strip order
///
/// Returns:
///
/// * `Vec<f64>` - amplitudes with saturated strips recovered where possible
pub fn saturation_correction_from_fits(amplitudes: &[u16]) -> Vec<f64> {
    let mut out: Vec<f64> = amplitudes.iter().map(|&a| a as f64).collect();
    let saturated: Vec<usize> = out.iter().positions(|&a| is_saturated(a)).collect();

    let (first, last) = match saturated.as_slice() {
        [i] => (*i, *i),
        [i, j] if j - i == 1 => (*i, *j),
        _ => return out,
    };
    if first == 0 || last + 1 >= out.len() {
        return out;
    }

    let left = out[first - 1];
    let right = out[last + 1];
    if left < SATURATION_NEIGHBOUR_MIN || right < SATURATION_NEIGHBOUR_MIN {
        return out;
    }

    let n_sat = (last - first + 1) as f64;
    let recovered = ((left + right) / (2.0 * CROSS_TALK_X1) / n_sat).max(STRIP_SATURATION_254 as f64);
    for a in &mut out[first..=last] {
        *a = recovered;
    }
    out
}

/// check that a strip cluster looks like a single particle deposit
///
/// Arguments:
///
/// * `amplitudes` - raw ADC amplitudes in strip order
/// * `invert_cross_talk` - apply [`cross_talk_inversion`] before the shape check
///
/// Returns:
///
/// * `bool` - true for exactly one local maximum and at most two adjacent saturated strips
pub fn strip_cluster_is_clean(amplitudes: &[u16], invert_cross_talk: bool) -> bool {
    if amplitudes.is_empty() {
        return false;
    }

    // Saturation pattern
    let saturated: Vec<usize> = amplitudes
        .iter()
        .positions(|&a| a >= STRIP_SATURATION_254)
        .collect();
    match saturated.as_slice() {
        [] | [_] => {}
        [i, j] if j - i == 1 => {}
        _ => return false,
    }

    let values = if invert_cross_talk {
        cross_talk_inversion(amplitudes, CROSS_TALK_X1, CROSS_TALK_X2)
    } else {
        amplitudes.iter().map(|&a| a as f64).collect()
    };

    count_local_maxima(&values) == 1
}

fn count_local_maxima(values: &[f64]) -> usize {
    // plateaus count once
    let profile: Vec<f64> = values.iter().copied().dedup().collect();
    let n = profile.len();
    (0..n)
        .filter(|&i| {
            let v = profile[i];
            v > 0.0
                && (i == 0 || v > profile[i - 1])
                && (i + 1 == n || v > profile[i + 1])
        })
        .count()
}

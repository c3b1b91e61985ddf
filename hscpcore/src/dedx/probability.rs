use serde::{Deserialize, Serialize};

use crate::detector::hit::HitCollection;

/// combine n independent probabilities given the log of their product
///
/// Uses the partial sum `P * sum_{k=0}^{n-1} (-ln P)^k / k!` built with the
/// recurrence `f_1 = -ln P`, `f_k = f_(k-1) * (-ln P) / k`. Working on the
/// log of the product keeps tracks with many hits from underflowing.
///
/// Arguments:
///
/// * `log_product` - sum of the logs of the individual probabilities
/// * `n` - number of combined probabilities
///
/// Returns:
///
/// * `f64` - combined probability, `0.0` for `n == 0`
///
/// # Examples
///
/// ```
/// use hscpcore::dedx::probability::combine_probs;
///
/// // a single probability is returned unchanged
/// let p = combine_probs(0.3f64.ln(), 1);
/// assert!((p - 0.3).abs() < 1e-12);
/// ```
pub fn combine_probs(log_product: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    if log_product == f64::NEG_INFINITY {
        return 0.0;
    }

    let minus_log = -log_product;
    let mut term = 1.0;
    if n > 1 {
        let mut fact = minus_log;
        term += fact;
        for k in 2..n {
            fact *= minus_log / k as f64;
            term += fact;
        }
    }

    // P * term evaluated in log space, exp(log P) alone underflows below ~1e-308
    (log_product + term.ln()).exp()
}

/// combine a slice of probabilities, see [`combine_probs`]
pub fn combine_prob_values(values: &[f64]) -> f64 {
    let log_product = values
        .iter()
        .map(|&p| if p > 0.0 { p.ln() } else { f64::NEG_INFINITY })
        .sum::<f64>();
    combine_probs(log_product, values.len())
}

/// A combined probability that rounded to exactly 0 or 1 carries no information.
#[inline]
pub fn is_degenerate(p: f64) -> bool {
    p == 0.0 || p == 1.0
}

/// Track level combination of the pixel template-fit probabilities
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelProbabilities {
    pub prob_q: f64,
    pub prob_xy: f64,
    pub prob_q_no_l1: f64,
    pub prob_xy_no_l1: f64,
    pub n_hits: usize,
    pub n_hits_no_l1: usize,
}

#[derive(Default)]
struct Product {
    log_q: f64,
    log_xy: f64,
    n: usize,
}

impl Product {
    fn push(&mut self, q: f64, xy: f64) {
        self.log_q += q.ln();
        self.log_xy += if xy > 0.0 { xy.ln() } else { f64::NEG_INFINITY };
        self.n += 1;
    }
}

impl PixelProbabilities {
    /// Combine probQ and probXY over the pixel hits of a track.
    ///
    /// Only hits with a positive probQ enter. The no-L1 variant skips pixel
    /// barrel layer 1.
    pub fn from_hits(hits: &HitCollection) -> Self {
        let mut all = Product::default();
        let mut no_l1 = Product::default();

        for hit in hits.pixel_hits() {
            let (q, xy) = match (hit.prob_q, hit.prob_xy) {
                (Some(q), Some(xy)) => (q, xy),
                (Some(q), None) => (q, 0.0),
                _ => continue,
            };
            if q <= 0.0 {
                continue;
            }
            all.push(q, xy);
            if !hit.is_pixel_barrel_layer1() {
                no_l1.push(q, xy);
            }
        }

        PixelProbabilities {
            prob_q: combine_probs(all.log_q, all.n),
            prob_xy: combine_probs(all.log_xy, all.n),
            prob_q_no_l1: combine_probs(no_l1.log_q, no_l1.n),
            prob_xy_no_l1: combine_probs(no_l1.log_xy, no_l1.n),
            n_hits: all.n,
            n_hits_no_l1: no_l1.n,
        }
    }

    /// Either probQ variant failed to combine.
    pub fn is_degenerate(&self) -> bool {
        is_degenerate(self.prob_q) || is_degenerate(self.prob_q_no_l1)
    }

    pub fn prob_q(&self) -> Option<f64> {
        (!is_degenerate(self.prob_q)).then_some(self.prob_q)
    }

    pub fn prob_q_no_l1(&self) -> Option<f64> {
        (!is_degenerate(self.prob_q_no_l1)).then_some(self.prob_q_no_l1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::hit::{DeDxHit, DetId, SubDetector};
    use statrs::distribution::{ChiSquared, ContinuousCDF};

    fn factorial(k: usize) -> f64 {
        (1..=k).map(|i| i as f64).product()
    }

    // direct product times series, no recurrence
    fn brute_force(values: &[f64]) -> f64 {
        let product: f64 = values.iter().product();
        let x = -product.ln();
        let series: f64 = (0..values.len()).map(|k| x.powi(k as i32) / factorial(k)).sum();
        product * series
    }

    #[test]
    fn test_combine_matches_direct_formula() {
        let cases: Vec<Vec<f64>> = vec![
            vec![0.42],
            vec![0.3, 0.8],
            vec![0.05, 0.5, 0.95],
            vec![0.2, 0.9, 0.6, 0.01],
            vec![1.0, 0.5, 0.5, 0.5],
        ];
        for values in cases {
            let got = combine_prob_values(&values);
            let expected = brute_force(&values);
            assert!((got - expected).abs() < 1e-12, "{:?}: {} vs {}", values, got, expected);
        }
    }

    #[test]
    fn test_combine_is_chi_square_tail() {
        let values = [0.2, 0.7, 0.35];
        let stat = -2.0 * values.iter().map(|p: &f64| p.ln()).sum::<f64>();
        let chi2 = ChiSquared::new(2.0 * values.len() as f64).unwrap();
        let expected = 1.0 - chi2.cdf(stat);
        assert!((combine_prob_values(&values) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_combine_no_underflow_for_many_hits() {
        let values = vec![0.9; 40];
        let got = combine_prob_values(&values);
        assert!(got > 0.0);
        assert!((got - brute_force(&values)).abs() < 1e-12);

        // long tracks of small probabilities underflow a naive product
        let small = vec![1e-9; 40];
        let naive: f64 = small.iter().product();
        assert_eq!(naive, 0.0);
        let log_product: f64 = small.iter().map(|p: &f64| p.ln()).sum();
        let combined = combine_probs(log_product, small.len());
        assert!(combined > 0.0 && combined < 1.0);
    }

    #[test]
    fn test_combine_edge_cases() {
        assert_eq!(combine_probs(0.0, 0), 0.0);
        assert_eq!(combine_probs(0.0, 3), 1.0);
        assert_eq!(combine_prob_values(&[0.0, 0.5]), 0.0);
    }

    fn pixel(layer: u8, q: f64, xy: f64) -> DeDxHit {
        DeDxHit::pixel(DetId::tracker(SubDetector::PixelBarrel, 7), layer, 25000.0, 0.0285)
            .with_probabilities(q, xy)
    }

    #[test]
    fn test_pixel_probabilities_skip_layer1() {
        let hits = HitCollection::new(vec![
            pixel(1, 0.5, 0.4),
            pixel(2, 0.3, 0.2),
            pixel(3, 0.0, 0.9), // not counted, probQ not positive
            DeDxHit::strip(DetId::tracker(SubDetector::Tob, 1), 1, vec![40, 80, 40], 0.05),
        ]);
        let probs = PixelProbabilities::from_hits(&hits);
        assert_eq!(probs.n_hits, 2);
        assert_eq!(probs.n_hits_no_l1, 1);
        assert!((probs.prob_q - combine_prob_values(&[0.5, 0.3])).abs() < 1e-12);
        assert!((probs.prob_q_no_l1 - 0.3).abs() < 1e-12);
        assert!((probs.prob_xy_no_l1 - 0.2).abs() < 1e-12);
        assert!(!probs.is_degenerate());
    }

    #[test]
    fn test_pixel_probabilities_degenerate_without_hits() {
        let hits = HitCollection::new(vec![pixel(1, 0.5, 0.4)]);
        let probs = PixelProbabilities::from_hits(&hits);
        // only a layer 1 hit, the no-L1 combination is empty
        assert_eq!(probs.prob_q_no_l1, 0.0);
        assert!(probs.is_degenerate());
        assert!(probs.prob_q_no_l1().is_none());
        assert_eq!(probs.prob_q(), Some(0.5));
    }
}

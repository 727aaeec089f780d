//! Reduction of the crossing and sentiment matrices to one polarization
//! score:
//!
//! ```text
//! v      = sum_ik (1/n - M[i][k])^2
//! vs     = sum_ik S[i][k]^2
//! pscore = (v / (n - 1) + vs / n^2) / 2
//! ```

use crate::error::{Error, Result};
use crate::matrix::SquareMatrix;

/// Deviation of the crossing matrix from the uniform `1/n` baseline.
pub fn structural_term(crossing: &SquareMatrix) -> f64 {
    let n = crossing.dim();
    let uniform = 1.0 / n as f64;
    crossing
        .rows()
        .flat_map(|row| row.iter())
        .map(|&m| (uniform - m).powi(2))
        .sum()
}

pub fn sentiment_term(sentiment: &SquareMatrix) -> f64 {
    sentiment.rows().flat_map(|row| row.iter()).map(|&s| s * s).sum()
}

/// Polarization score. Zero for fewer than two communities.
pub fn polarization_score(crossing: &SquareMatrix, sentiment: &SquareMatrix) -> Result<f64> {
    let n = crossing.dim();
    if sentiment.dim() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: sentiment.dim(),
        });
    }
    if n <= 1 {
        return Ok(0.0);
    }
    let nf = n as f64;
    let v = structural_term(crossing);
    let vs = sentiment_term(sentiment);
    Ok((v / (nf - 1.0) + vs / (nf * nf)) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn closed_form_two_communities() {
        let m = SquareMatrix::from_rows(&[vec![0.7, 0.3], vec![0.4, 0.6]]);
        let s = SquareMatrix::zeros(2);
        assert!((structural_term(&m) - 0.08).abs() < 1e-12);
        assert!((polarization_score(&m, &s).unwrap() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn sentiment_contributes() {
        let m = SquareMatrix::from_rows(&[vec![0.5, 0.5], vec![0.5, 0.5]]);
        let s = SquareMatrix::from_rows(&[vec![0.0, 1.0], vec![0.5, 0.0]]);
        // v = 0, vs = 1.25, pscore = (0 + 1.25 / 4) / 2
        assert!((polarization_score(&m, &s).unwrap() - 0.15625).abs() < 1e-12);
    }

    #[test]
    fn echo_chamber_three_communities() {
        let mut m = SquareMatrix::zeros(3);
        for i in 0..3 {
            m.add(i, i, 1.0);
        }
        // Each row: (1/3 - 1)^2 + 2 * (1/3)^2 = 6/9.
        let expected = (3.0 * 6.0 / 9.0) / 2.0 / 2.0;
        let pscore = polarization_score(&m, &SquareMatrix::zeros(3)).unwrap();
        assert!((pscore - expected).abs() < 1e-12);
    }

    #[test]
    fn single_community_scores_zero() {
        let m = SquareMatrix::from_rows(&[vec![1.0]]);
        assert_eq!(polarization_score(&m, &SquareMatrix::zeros(1)).unwrap(), 0.0);
        let empty = SquareMatrix::zeros(0);
        assert_eq!(polarization_score(&empty, &empty).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_dimensions_rejected() {
        let result = polarization_score(&SquareMatrix::zeros(2), &SquareMatrix::zeros(3));
        assert!(matches!(result, Err(Error::DimensionMismatch { expected: 2, found: 3 })));
    }

    proptest! {
        #[test]
        fn score_is_non_negative(values in proptest::collection::vec(0.0f64..1.0, 8)) {
            let m = SquareMatrix::from_rows(&[values[0..2].to_vec(), values[2..4].to_vec()]);
            let s = SquareMatrix::from_rows(&[values[4..6].to_vec(), values[6..8].to_vec()]);
            prop_assert!(polarization_score(&m, &s).unwrap() >= 0.0);
        }
    }
}

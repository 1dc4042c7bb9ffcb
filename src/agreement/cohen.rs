//! Cohen's kappa for two raters.

use serde::{Deserialize, Serialize};

use super::{category_index, chance_corrected, null_test, resolve_categories, AgreementError};
use crate::ratings::Score;

/// Disagreement credit for ordinal scales. Weights are computed from category
/// positions, not raw score values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Unweighted,
    Linear,
    Quadratic,
}

impl Weighting {
    fn weight(self, i: usize, j: usize, q: usize) -> f64 {
        if i == j {
            return 1.0;
        }
        let span = (q - 1) as f64;
        let dist = (i as f64 - j as f64).abs() / span;
        match self {
            Weighting::Unweighted => 0.0,
            Weighting::Linear => 1.0 - dist,
            Weighting::Quadratic => 1.0 - dist * dist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohenKappa {
    pub subjects: usize,
    pub categories: Vec<Score>,
    pub weighting: Weighting,
    /// Weighted observed agreement.
    pub observed: f64,
    /// Weighted agreement expected from the marginals.
    pub expected: f64,
    pub kappa: Option<f64>,
    /// Standard error under the null of chance agreement.
    pub std_err: Option<f64>,
    pub z: Option<f64>,
    pub p_value: Option<f64>,
}

/// Cohen's kappa over `(rater_a, rater_b)` score pairs.
///
/// `categories` fixes the category set (needed when a category is possible
/// but unobserved, which changes weighted kappa); otherwise the union of
/// observed scores is used. The standard error follows Fleiss, Cohen &
/// Everitt (1969) under the null hypothesis.
pub fn cohen_kappa(
    pairs: &[(Score, Score)],
    weighting: Weighting,
    categories: Option<&[Score]>,
) -> Result<CohenKappa, AgreementError> {
    if pairs.is_empty() {
        return Err(AgreementError::NoSubjects);
    }
    let categories =
        resolve_categories(categories, pairs.iter().flat_map(|&(a, b)| [a, b]))?;
    let q = categories.len();
    let n = pairs.len() as f64;

    let mut table = vec![vec![0.0f64; q]; q];
    for &(a, b) in pairs {
        let i = category_index(&categories, a)?;
        let j = category_index(&categories, b)?;
        table[i][j] += 1.0 / n;
    }

    let rows: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let cols: Vec<f64> = (0..q).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    let weights: Vec<Vec<f64>> = (0..q)
        .map(|i| (0..q).map(|j| weighting.weight(i, j, q)).collect())
        .collect();

    let mut observed = 0.0;
    let mut expected = 0.0;
    for i in 0..q {
        for j in 0..q {
            observed += weights[i][j] * table[i][j];
            expected += weights[i][j] * rows[i] * cols[j];
        }
    }
    let kappa = chance_corrected(observed, expected);

    // Row/column mean weights for the null variance.
    let w_row: Vec<f64> = (0..q)
        .map(|i| (0..q).map(|j| cols[j] * weights[i][j]).sum())
        .collect();
    let w_col: Vec<f64> = (0..q)
        .map(|j| (0..q).map(|i| rows[i] * weights[i][j]).sum())
        .collect();
    let mut acc = 0.0;
    for i in 0..q {
        for j in 0..q {
            let d = weights[i][j] - (w_row[i] + w_col[j]);
            acc += rows[i] * cols[j] * d * d;
        }
    }
    let one_minus = 1.0 - expected;
    let variance = (acc - expected * expected) / (n * one_minus * one_minus);
    let (std_err, z, p_value) = if kappa.is_some() {
        null_test(kappa, variance)
    } else {
        (None, None, None)
    };

    Ok(CohenKappa {
        subjects: pairs.len(),
        categories,
        weighting,
        observed,
        expected,
        kappa,
        std_err,
        z,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_pairs(a: usize, b: usize, c: usize, d: usize) -> Vec<(Score, Score)> {
        let mut pairs = Vec::new();
        pairs.extend(std::iter::repeat((1, 1)).take(a));
        pairs.extend(std::iter::repeat((1, 0)).take(b));
        pairs.extend(std::iter::repeat((0, 1)).take(c));
        pairs.extend(std::iter::repeat((0, 0)).take(d));
        pairs
    }

    #[test]
    fn textbook_two_by_two() {
        // 20 both-yes, 5 A-only, 10 B-only, 15 both-no.
        let k = cohen_kappa(&table_pairs(20, 5, 10, 15), Weighting::Unweighted, None).unwrap();
        assert_eq!(k.subjects, 50);
        assert!((k.observed - 0.7).abs() < 1e-12);
        assert!((k.expected - 0.5).abs() < 1e-12);
        assert!((k.kappa.unwrap() - 0.4).abs() < 1e-12);
        assert!((k.std_err.unwrap() - 0.0192f64.sqrt()).abs() < 1e-9);
        assert!((k.z.unwrap() - 2.886751).abs() < 1e-5);
        assert!(k.p_value.unwrap() < 0.01);
    }

    #[test]
    fn constant_identical_raters_leave_kappa_undefined() {
        let pairs = vec![(1, 1); 10];
        let k = cohen_kappa(&pairs, Weighting::Unweighted, Some(&[0, 1])).unwrap();
        assert_eq!(k.observed, 1.0);
        assert_eq!(k.kappa, None);
        assert_eq!(k.z, None);
    }

    #[test]
    fn perfect_agreement_is_one() {
        let pairs = vec![(1, 1), (2, 2), (3, 3), (1, 1)];
        let k = cohen_kappa(&pairs, Weighting::Unweighted, None).unwrap();
        assert!((k.kappa.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn quadratic_weights_credit_near_misses() {
        let pairs = vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 5), (1, 1)];
        let plain = cohen_kappa(&pairs, Weighting::Unweighted, Some(&[1, 2, 3, 4, 5])).unwrap();
        let quad = cohen_kappa(&pairs, Weighting::Quadratic, Some(&[1, 2, 3, 4, 5])).unwrap();
        assert!(quad.kappa.unwrap() > plain.kappa.unwrap());
    }

    #[test]
    fn unknown_category_is_an_error() {
        let err = cohen_kappa(&[(1, 7)], Weighting::Unweighted, Some(&[0, 1])).unwrap_err();
        assert_eq!(err, AgreementError::UnknownCategory(7));
    }

    #[test]
    fn empty_pairs_is_an_error() {
        assert_eq!(
            cohen_kappa(&[], Weighting::Unweighted, None).unwrap_err(),
            AgreementError::NoSubjects
        );
    }
}

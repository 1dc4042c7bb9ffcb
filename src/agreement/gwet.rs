//! Gwet's AC1 agreement coefficient.
//!
//! Unlike kappa, AC1's chance term `Σ π_k (1 - π_k) / (q - 1)` shrinks when
//! ratings pile into one category, so it stays informative for the highly
//! skewed accept/reject splits LLM judges tend to produce. Raters may skip
//! items; observed agreement uses subjects with at least two ratings.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::{category_index, resolve_categories, AgreementError, UNDEFINED_EPS};
use crate::ratings::{RatingMatrix, Score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GwetAc1 {
    /// Subjects with at least one rating.
    pub subjects: usize,
    /// Subjects with at least two ratings (those that carry agreement).
    pub paired_subjects: usize,
    pub raters: usize,
    pub categories: Vec<Score>,
    pub observed: f64,
    pub expected: f64,
    pub coefficient: Option<f64>,
    pub std_err: Option<f64>,
    pub conf_level: f64,
    pub conf_int: Option<(f64, f64)>,
    /// One-sided p-value for `AC1 > 0`.
    pub p_value: Option<f64>,
}

/// AC1 over the rows of `matrix`, with a Student-t interval at `conf_level`
/// clamped to `[-1, 1]`.
///
/// The variance is conditional on the rater sample (no finite-population
/// correction).
pub fn gwet_ac1(
    matrix: &RatingMatrix,
    categories: Option<&[Score]>,
    conf_level: f64,
) -> Result<GwetAc1, AgreementError> {
    if !(conf_level > 0.0 && conf_level < 1.0) {
        return Err(AgreementError::InvalidLevel(conf_level));
    }
    let categories = resolve_categories(categories, matrix.observed_scores())?;
    let q = categories.len();

    // r_ik: ratings of subject i in category k, for subjects with any rating.
    let mut counts: Vec<Vec<f64>> = Vec::new();
    for row in matrix.rows() {
        if row.rating_count() == 0 {
            continue;
        }
        let mut line = vec![0.0; q];
        for score in row.present() {
            line[category_index(&categories, score)?] += 1.0;
        }
        counts.push(line);
    }
    let totals: Vec<f64> = counts.iter().map(|row| row.iter().sum()).collect();
    let n = counts.len();
    let n2 = totals.iter().filter(|&&r| r >= 2.0).count();
    if n2 == 0 {
        return Err(AgreementError::NoSubjects);
    }
    let nf = n as f64;
    let n2f = n2 as f64;

    let pa_i: Vec<f64> = counts
        .iter()
        .zip(&totals)
        .map(|(row, &r)| {
            if r >= 2.0 {
                row.iter().map(|c| c * (c - 1.0)).sum::<f64>() / (r * (r - 1.0))
            } else {
                0.0
            }
        })
        .collect();
    let observed = pa_i.iter().sum::<f64>() / n2f;

    let pi: Vec<f64> = (0..q)
        .map(|k| {
            counts
                .iter()
                .zip(&totals)
                .map(|(row, &r)| row[k] / r)
                .sum::<f64>()
                / nf
        })
        .collect();

    let base = GwetAc1 {
        subjects: n,
        paired_subjects: n2,
        raters: matrix.n_raters(),
        categories,
        observed,
        expected: 0.0,
        coefficient: None,
        std_err: None,
        conf_level,
        conf_int: None,
        p_value: None,
    };
    if q < 2 {
        // Single category: chance agreement is undefined.
        return Ok(GwetAc1 {
            expected: 1.0,
            ..base
        });
    }

    let qm1 = (q - 1) as f64;
    let expected = pi.iter().map(|p| p * (1.0 - p)).sum::<f64>() / qm1;
    let one_minus = 1.0 - expected;
    if one_minus.abs() <= UNDEFINED_EPS {
        return Ok(GwetAc1 { expected, ..base });
    }
    let ac1 = (observed - expected) / one_minus;

    let mut ss = 0.0;
    for ((row, &r), &pa) in counts.iter().zip(&totals).zip(&pa_i) {
        let pe_r2 = if r >= 2.0 { expected } else { 0.0 };
        let ac1_i = (nf / n2f) * (pa - pe_r2) / one_minus;
        let pe_i = row
            .iter()
            .zip(&pi)
            .map(|(c, p)| c * (1.0 - p))
            .sum::<f64>()
            / (qm1 * r);
        let adjusted = ac1_i - 2.0 * (1.0 - ac1) * (pe_i - expected) / one_minus;
        ss += (adjusted - ac1) * (adjusted - ac1);
    }

    let (std_err, conf_int, p_value) = if n >= 2 {
        let variance = ss / (nf * (nf - 1.0));
        let se = variance.sqrt();
        let t = StudentsT::new(0.0, 1.0, nf - 1.0)
            .map_err(|e| AgreementError::Distribution(e.to_string()))?;
        let crit = t.inverse_cdf(1.0 - (1.0 - conf_level) / 2.0);
        let ci = (
            (ac1 - crit * se).max(-1.0),
            (ac1 + crit * se).min(1.0),
        );
        let p = (se > 0.0).then(|| 1.0 - t.cdf(ac1 / se));
        (Some(se), Some(ci), p)
    } else {
        (None, None, None)
    };

    Ok(GwetAc1 {
        expected,
        coefficient: Some(ac1),
        std_err,
        conf_int,
        p_value,
        ..base
    })
}

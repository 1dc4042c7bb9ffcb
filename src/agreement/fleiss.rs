//! Fleiss' kappa for a fixed number of raters per subject.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{category_index, chance_corrected, null_test, resolve_categories, AgreementError};
use crate::ratings::{RatingMatrix, Score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKappa {
    pub category: Score,
    /// Share of all ratings that fell in this category.
    pub proportion: f64,
    pub kappa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleissKappa {
    pub subjects: usize,
    pub raters_per_subject: usize,
    /// Subjects left out because they lacked a full set of ratings.
    pub dropped_subjects: usize,
    pub categories: Vec<Score>,
    pub observed: f64,
    pub expected: f64,
    pub kappa: Option<f64>,
    pub std_err: Option<f64>,
    pub z: Option<f64>,
    pub p_value: Option<f64>,
    pub per_category: Vec<CategoryKappa>,
}

/// Fleiss' kappa over the rows of `matrix`.
///
/// The rater count `m` is the largest number of ratings any row has; rows
/// with fewer than `m` ratings are dropped (and counted) since the statistic
/// assumes a constant number of raters per subject.
pub fn fleiss_kappa(
    matrix: &RatingMatrix,
    categories: Option<&[Score]>,
) -> Result<FleissKappa, AgreementError> {
    let categories = resolve_categories(categories, matrix.observed_scores())?;
    let m = matrix
        .rows()
        .iter()
        .map(|row| row.rating_count())
        .max()
        .unwrap_or(0);
    if m < 2 {
        return Err(AgreementError::TooFewRaters(m));
    }

    let mut counts = Vec::new();
    let mut dropped = 0usize;
    for row in matrix.rows() {
        if row.rating_count() != m {
            dropped += 1;
            continue;
        }
        let mut line = vec![0usize; categories.len()];
        for score in row.present() {
            line[category_index(&categories, score)?] += 1;
        }
        counts.push(line);
    }
    if dropped > 0 {
        warn!(
            dropped,
            raters = m,
            "Fleiss kappa: dropped subjects without a full set of ratings"
        );
    }

    let mut result = from_table(&counts, categories)?;
    result.dropped_subjects = dropped;
    Ok(result)
}

/// Fleiss' kappa from a subjects × categories count table. Categories are
/// labelled `0..q` in column order.
pub fn fleiss_kappa_from_counts(counts: &[Vec<usize>]) -> Result<FleissKappa, AgreementError> {
    let q = counts.first().map(Vec::len).unwrap_or(0);
    let categories = (0..q as Score).collect();
    from_table(counts, categories)
}

fn from_table(counts: &[Vec<usize>], categories: Vec<Score>) -> Result<FleissKappa, AgreementError> {
    let Some(first) = counts.first() else {
        return Err(AgreementError::NoSubjects);
    };
    let q = categories.len();
    if q == 0 {
        return Err(AgreementError::NoCategories);
    }
    if counts.iter().any(|row| row.len() != q) {
        return Err(AgreementError::RaggedCounts);
    }
    let m: usize = first.iter().sum();
    if m < 2 {
        return Err(AgreementError::TooFewRaters(m));
    }
    for (subject, row) in counts.iter().enumerate() {
        let got: usize = row.iter().sum();
        if got != m {
            return Err(AgreementError::UnequalRaters {
                subject,
                got,
                expected: m,
            });
        }
    }

    let n = counts.len() as f64;
    let mf = m as f64;
    let total = n * mf;

    let proportions: Vec<f64> = (0..q)
        .map(|j| counts.iter().map(|row| row[j] as f64).sum::<f64>() / total)
        .collect();

    let observed = counts
        .iter()
        .map(|row| {
            let sq: f64 = row.iter().map(|&c| (c * c) as f64).sum();
            (sq - mf) / (mf * (mf - 1.0))
        })
        .sum::<f64>()
        / n;
    let expected: f64 = proportions.iter().map(|p| p * p).sum();
    let kappa = chance_corrected(observed, expected);

    // Null variance, Fleiss, Nee & Landis (1979).
    let pq: Vec<f64> = proportions.iter().map(|p| p * (1.0 - p)).collect();
    let sum_pq: f64 = pq.iter().sum();
    let variance = if sum_pq > 0.0 {
        let skew: f64 = proportions
            .iter()
            .zip(&pq)
            .map(|(p, pq)| pq * ((1.0 - p) - p))
            .sum();
        2.0 / (total * (mf - 1.0)) * (sum_pq * sum_pq - skew) / (sum_pq * sum_pq)
    } else {
        f64::NAN
    };
    let (std_err, z, p_value) = null_test(kappa, variance);

    let per_category = categories
        .iter()
        .enumerate()
        .map(|(j, &category)| {
            let disagreement: f64 = counts
                .iter()
                .map(|row| (row[j] * (m - row[j])) as f64)
                .sum();
            let denom = total * (mf - 1.0) * pq[j];
            CategoryKappa {
                category,
                proportion: proportions[j],
                kappa: (denom > 0.0).then(|| 1.0 - disagreement / denom),
            }
        })
        .collect();

    Ok(FleissKappa {
        subjects: counts.len(),
        raters_per_subject: m,
        dropped_subjects: 0,
        categories,
        observed,
        expected,
        kappa,
        std_err,
        z,
        p_value,
        per_category,
    })
}

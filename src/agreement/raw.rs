//! Uncorrected agreement and the bias/prevalence indices.

use serde::{Deserialize, Serialize};

use super::AgreementError;
use crate::binarize::Verdict;
use crate::ratings::{RatingMatrix, Score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAgreement {
    /// Subjects with at least two ratings.
    pub subjects: usize,
    /// Share of subjects on which every rater gave the same score.
    pub all_agree: f64,
    /// Mean share of agreeing rater pairs per subject.
    pub pairwise: f64,
}

pub fn raw_agreement(matrix: &RatingMatrix) -> Result<RawAgreement, AgreementError> {
    let mut subjects = 0usize;
    let mut unanimous = 0usize;
    let mut pairwise = 0.0;
    for row in matrix.rows() {
        let scores: Vec<Score> = row.present().collect();
        if scores.len() < 2 {
            continue;
        }
        subjects += 1;
        if scores.iter().all(|&s| s == scores[0]) {
            unanimous += 1;
        }
        let mut agreeing = 0usize;
        let mut total = 0usize;
        for i in 0..scores.len() {
            for j in (i + 1)..scores.len() {
                total += 1;
                if scores[i] == scores[j] {
                    agreeing += 1;
                }
            }
        }
        pairwise += agreeing as f64 / total as f64;
    }
    if subjects == 0 {
        return Err(AgreementError::NoSubjects);
    }
    Ok(RawAgreement {
        subjects,
        all_agree: unanimous as f64 / subjects as f64,
        pairwise: pairwise / subjects as f64,
    })
}

/// Share of pairs with identical scores.
pub fn pair_agreement(pairs: &[(Score, Score)]) -> Result<f64, AgreementError> {
    if pairs.is_empty() {
        return Err(AgreementError::NoSubjects);
    }
    let same = pairs.iter().filter(|(a, b)| a == b).count();
    Ok(same as f64 / pairs.len() as f64)
}

/// Byrt, Bishop & Carlin indices for a binary 2×2 table.
///
/// With `a` = both accept, `b` = only A accepts, `c` = only B accepts and
/// `d` = both reject, `bias_index = (b - c) / n`, which equals the
/// difference in accept rates. Positive means rater A accepts more often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasIndex {
    pub subjects: usize,
    pub positive_rate_a: f64,
    pub positive_rate_b: f64,
    pub bias_index: f64,
    pub abs_bias_index: f64,
    /// `(a - d) / n`.
    pub prevalence_index: f64,
    /// Prevalence- and bias-adjusted kappa, `2 p_o - 1`.
    pub pabak: f64,
}

pub fn bias_index(pairs: &[(Score, Score)]) -> Result<BiasIndex, AgreementError> {
    if pairs.is_empty() {
        return Err(AgreementError::NoSubjects);
    }
    let (mut a, mut b, mut c, mut d) = (0usize, 0usize, 0usize, 0usize);
    for &(x, y) in pairs {
        let vx = Verdict::from_score(x).ok_or(AgreementError::NotBinary(x))?;
        let vy = Verdict::from_score(y).ok_or(AgreementError::NotBinary(y))?;
        match (vx, vy) {
            (Verdict::Accept, Verdict::Accept) => a += 1,
            (Verdict::Accept, Verdict::Reject) => b += 1,
            (Verdict::Reject, Verdict::Accept) => c += 1,
            (Verdict::Reject, Verdict::Reject) => d += 1,
        }
    }
    let n = pairs.len() as f64;
    let bias = (b as f64 - c as f64) / n;
    let observed = (a + d) as f64 / n;
    Ok(BiasIndex {
        subjects: pairs.len(),
        positive_rate_a: (a + b) as f64 / n,
        positive_rate_b: (a + c) as f64 / n,
        bias_index: bias,
        abs_bias_index: bias.abs(),
        prevalence_index: (a as f64 - d as f64) / n,
        pabak: 2.0 * observed - 1.0,
    })
}

//! Agreement coefficients for categorical ratings.
//!
//! Every calculator works on a subset of a [`RatingMatrix`](crate::ratings::RatingMatrix)
//! (or on score pairs for two-rater statistics) and returns a serializable
//! result. A coefficient whose chance agreement reaches 1 is undefined and
//! comes back as `None`, never NaN.
//!
//! - [`cohen`]: Cohen's kappa, optionally weighted, with null z-test
//! - [`fleiss`]: Fleiss' kappa for a fixed number of raters per subject
//! - [`gwet`]: Gwet's AC1 with missing ratings allowed
//! - [`raw`]: percent agreement and the bias index
//! - [`bootstrap`]: percentile bootstrap interval for Cohen's kappa

pub mod bootstrap;
pub mod cohen;
pub mod fleiss;
pub mod gwet;
pub mod raw;

pub use bootstrap::{bootstrap_kappa, BootstrapConfig, BootstrapInterval};
pub use cohen::{cohen_kappa, CohenKappa, Weighting};
pub use fleiss::{fleiss_kappa, fleiss_kappa_from_counts, CategoryKappa, FleissKappa};
pub use gwet::{gwet_ac1, GwetAc1};
pub use raw::{bias_index, pair_agreement, raw_agreement, BiasIndex, RawAgreement};

use statrs::distribution::{ContinuousCDF, Normal};

use crate::ratings::Score;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AgreementError {
    #[error("no subjects to compare")]
    NoSubjects,
    #[error("empty category set")]
    NoCategories,
    #[error("score {0} is not in the category set")]
    UnknownCategory(Score),
    #[error("bias index needs binary 0/1 ratings, found {0}")]
    NotBinary(Score),
    #[error("count table rows have different lengths")]
    RaggedCounts,
    #[error("subject {subject} has {got} ratings, expected {expected}")]
    UnequalRaters {
        subject: usize,
        got: usize,
        expected: usize,
    },
    #[error("need at least two ratings per subject, found {0}")]
    TooFewRaters(usize),
    #[error("invalid confidence level: {0}")]
    InvalidLevel(f64),
    #[error("distribution error: {0}")]
    Distribution(String),
}

/// Below this, `1 - p_e` is treated as zero.
pub(crate) const UNDEFINED_EPS: f64 = 1e-12;

pub(crate) fn chance_corrected(observed: f64, expected: f64) -> Option<f64> {
    let denom = 1.0 - expected;
    if denom.abs() <= UNDEFINED_EPS {
        None
    } else {
        Some((observed - expected) / denom)
    }
}

/// Two-sided p-value of a standard normal statistic.
pub(crate) fn two_sided_p(z: f64) -> f64 {
    let normal = Normal::standard();
    (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0)
}

/// z-test under the null of chance agreement, when the standard error is usable.
pub(crate) fn null_test(estimate: Option<f64>, variance: f64) -> (Option<f64>, Option<f64>, Option<f64>) {
    if !variance.is_finite() || variance <= 0.0 {
        return (None, None, None);
    }
    let se = variance.sqrt();
    match estimate {
        Some(k) => {
            let z = k / se;
            (Some(se), Some(z), Some(two_sided_p(z)))
        }
        None => (Some(se), None, None),
    }
}

/// Resolve the category set: the caller's list (sorted, deduplicated) or the
/// observed scores.
pub(crate) fn resolve_categories(
    explicit: Option<&[Score]>,
    observed: impl IntoIterator<Item = Score>,
) -> Result<Vec<Score>, AgreementError> {
    let mut cats: Vec<Score> = match explicit {
        Some(c) => c.to_vec(),
        None => observed.into_iter().collect(),
    };
    cats.sort_unstable();
    cats.dedup();
    if cats.is_empty() {
        return Err(AgreementError::NoCategories);
    }
    Ok(cats)
}

pub(crate) fn category_index(categories: &[Score], score: Score) -> Result<usize, AgreementError> {
    categories
        .binary_search(&score)
        .map_err(|_| AgreementError::UnknownCategory(score))
}

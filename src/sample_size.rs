//! Closed-form subject counts for kappa studies with binary outcomes.
//!
//! Two questions are answered:
//! - **Power**: how many subjects are needed to reject `H0: κ = κ0` in favour
//!   of `κ1` at a given α and power, for `raters` raters per subject.
//! - **Precision**: how many subjects keep the confidence interval around an
//!   expected kappa within a half-width (two raters).
//!
//! The power calculation is the Donner & Eliasziw goodness-of-fit approach.
//! Under the common-correlation model the number of positive ratings a
//! subject receives from `k` raters is beta-binomial with mean `π` and
//! intra-class correlation `κ`; the 1-df chi-square noncentrality
//! `λ = (z_{1-α/2} + z_{power})²` is divided by the per-subject chi-square
//! distance between the outcome distributions under `κ1` and `κ0`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SampleSizeError {
    #[error("prevalence must be in (0, 1), got {0}")]
    Prevalence(f64),
    #[error("null kappa must be in [0, 1), got {0}")]
    NullKappa(f64),
    #[error("alternative kappa must be in [0, 1], got {0}")]
    AltKappa(f64),
    #[error("kappa must be in [0, 1), got {0}")]
    Kappa(f64),
    #[error("null and alternative kappa must differ")]
    NoEffect,
    #[error("need at least 2 raters, got {0}")]
    Raters(usize),
    #[error("alpha must be in (0, 1), got {0}")]
    Alpha(f64),
    #[error("power must be in (0, 1), got {0}")]
    Power(f64),
    #[error("half-width must be positive, got {0}")]
    HalfWidth(f64),
    #[error("subject count must be positive")]
    NoSubjects,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerRequest {
    pub kappa0: f64,
    pub kappa1: f64,
    /// Probability that a rating is positive (accept).
    pub prevalence: f64,
    pub raters: usize,
    /// Two-sided significance level.
    pub alpha: f64,
    pub power: f64,
}

impl Default for PowerRequest {
    fn default() -> Self {
        Self {
            kappa0: 0.4,
            kappa1: 0.6,
            prevalence: 0.5,
            raters: 2,
            alpha: 0.05,
            power: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEstimate {
    pub request: PowerRequest,
    /// Required subjects, rounded up.
    pub subjects: usize,
    /// Unrounded solution.
    pub exact: f64,
    pub noncentrality: f64,
    /// Chi-square distance per subject between the alternative and null.
    pub effect_per_subject: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionRequest {
    pub kappa: f64,
    pub prevalence: f64,
    /// Target half-width of the two-sided interval.
    pub half_width: f64,
    pub alpha: f64,
}

impl Default for PrecisionRequest {
    fn default() -> Self {
        Self {
            kappa: 0.6,
            prevalence: 0.5,
            half_width: 0.1,
            alpha: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionEstimate {
    pub request: PrecisionRequest,
    pub subjects: usize,
    pub exact: f64,
    /// Asymptotic `n · Var(κ̂)`.
    pub variance_per_subject: f64,
}

/// Subjects needed to detect `kappa1` against `kappa0`.
pub fn power_binary(req: &PowerRequest) -> Result<PowerEstimate, SampleSizeError> {
    validate_power_inputs(req.kappa0, req.kappa1, req.prevalence, req.raters, req.alpha)?;
    if !(req.power > 0.0 && req.power < 1.0) {
        return Err(SampleSizeError::Power(req.power));
    }
    let effect = effect_per_subject(req.kappa0, req.kappa1, req.prevalence, req.raters);
    let normal = Normal::standard();
    let z_alpha = normal.inverse_cdf(1.0 - req.alpha / 2.0);
    let z_power = normal.inverse_cdf(req.power);
    let noncentrality = (z_alpha + z_power).powi(2);
    let exact = noncentrality / effect;
    Ok(PowerEstimate {
        request: req.clone(),
        subjects: (exact.ceil() as usize).max(1),
        exact,
        noncentrality,
        effect_per_subject: effect,
    })
}

/// Power of the goodness-of-fit test with `subjects` subjects.
pub fn achieved_power(
    kappa0: f64,
    kappa1: f64,
    prevalence: f64,
    raters: usize,
    alpha: f64,
    subjects: usize,
) -> Result<f64, SampleSizeError> {
    validate_power_inputs(kappa0, kappa1, prevalence, raters, alpha)?;
    if subjects == 0 {
        return Err(SampleSizeError::NoSubjects);
    }
    let effect = effect_per_subject(kappa0, kappa1, prevalence, raters);
    let normal = Normal::standard();
    let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);
    let root = (subjects as f64 * effect).sqrt();
    // P(χ²₁(λ) > z²) for a 1-df noncentral chi-square.
    Ok(normal.cdf(root - z_alpha) + normal.cdf(-root - z_alpha))
}

/// Subjects needed for a `±half_width` interval around `kappa` (two raters).
pub fn precision_binary(req: &PrecisionRequest) -> Result<PrecisionEstimate, SampleSizeError> {
    if !(req.kappa >= 0.0 && req.kappa < 1.0) {
        return Err(SampleSizeError::Kappa(req.kappa));
    }
    check_prevalence(req.prevalence)?;
    check_alpha(req.alpha)?;
    if !(req.half_width > 0.0) {
        return Err(SampleSizeError::HalfWidth(req.half_width));
    }
    let k = req.kappa;
    let p = req.prevalence;
    let variance = (1.0 - k) * ((1.0 - k) * (1.0 - 2.0 * k) + k * (2.0 - k) / (2.0 * p * (1.0 - p)));
    let z = Normal::standard().inverse_cdf(1.0 - req.alpha / 2.0);
    let exact = z * z * variance / (req.half_width * req.half_width);
    Ok(PrecisionEstimate {
        request: req.clone(),
        subjects: (exact.ceil() as usize).max(1),
        exact,
        variance_per_subject: variance,
    })
}

/// Probability that a subject receives `j` positive ratings from `raters`
/// raters, `j = 0..=raters`, under prevalence `π` and kappa `κ ∈ [0, 1]`.
pub fn outcome_distribution(prevalence: f64, kappa: f64, raters: usize) -> Vec<f64> {
    let k = raters;
    if kappa >= 1.0 {
        let mut probs = vec![0.0; k + 1];
        probs[0] = 1.0 - prevalence;
        probs[k] = prevalence;
        return probs;
    }
    // Rising factorials of the beta-binomial, scaled by κ so κ = 0 reduces to
    // the binomial without dividing by zero.
    let pos = prevalence * (1.0 - kappa);
    let neg = (1.0 - prevalence) * (1.0 - kappa);
    let base = 1.0 - kappa;
    let denom: f64 = (0..k).map(|i| base + i as f64 * kappa).product();
    (0..=k)
        .map(|j| {
            let up: f64 = (0..j).map(|i| pos + i as f64 * kappa).product();
            let down: f64 = (0..k - j).map(|i| neg + i as f64 * kappa).product();
            binomial(k, j) * up * down / denom
        })
        .collect()
}

fn effect_per_subject(kappa0: f64, kappa1: f64, prevalence: f64, raters: usize) -> f64 {
    let null = outcome_distribution(prevalence, kappa0, raters);
    let alt = outcome_distribution(prevalence, kappa1, raters);
    null.iter()
        .zip(&alt)
        .filter(|(p0, _)| **p0 > 0.0)
        .map(|(p0, p1)| (p1 - p0).powi(2) / p0)
        .sum()
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn validate_power_inputs(
    kappa0: f64,
    kappa1: f64,
    prevalence: f64,
    raters: usize,
    alpha: f64,
) -> Result<(), SampleSizeError> {
    if !(kappa0 >= 0.0 && kappa0 < 1.0) {
        return Err(SampleSizeError::NullKappa(kappa0));
    }
    if !(kappa1 >= 0.0 && kappa1 <= 1.0) {
        return Err(SampleSizeError::AltKappa(kappa1));
    }
    if (kappa1 - kappa0).abs() < 1e-12 {
        return Err(SampleSizeError::NoEffect);
    }
    check_prevalence(prevalence)?;
    if raters < 2 {
        return Err(SampleSizeError::Raters(raters));
    }
    check_alpha(alpha)
}

fn check_prevalence(p: f64) -> Result<(), SampleSizeError> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(SampleSizeError::Prevalence(p))
    }
}

fn check_alpha(alpha: f64) -> Result<(), SampleSizeError> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(SampleSizeError::Alpha(alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_rater_distribution_matches_closed_form() {
        let (p, k) = (0.3, 0.4);
        let d = outcome_distribution(p, k, 2);
        assert!((d[2] - (p * p + p * (1.0 - p) * k)).abs() < 1e-12);
        assert!((d[1] - 2.0 * p * (1.0 - p) * (1.0 - k)).abs() < 1e-12);
        assert!((d[0] - ((1.0 - p) * (1.0 - p) + p * (1.0 - p) * k)).abs() < 1e-12);
    }

    #[test]
    fn distributions_sum_to_one() {
        for raters in 2..=6 {
            for &kappa in &[0.0, 0.3, 0.8, 1.0] {
                let total: f64 = outcome_distribution(0.2, kappa, raters).iter().sum();
                assert!((total - 1.0).abs() < 1e-12, "raters={raters} kappa={kappa}");
            }
        }
    }

    #[test]
    fn binomial_coefficients() {
        assert_eq!(binomial(5, 2), 10.0);
        assert_eq!(binomial(6, 0), 1.0);
        assert_eq!(binomial(6, 6), 1.0);
    }
}

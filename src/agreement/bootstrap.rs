//! Percentile bootstrap interval for Cohen's kappa.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::cohen::{cohen_kappa, Weighting};
use super::{resolve_categories, AgreementError};
use crate::ratings::Score;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Resamples per interval; 0 disables the bootstrap.
    pub resamples: usize,
    pub seed: u64,
    pub level: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resamples: 1000,
            seed: 42,
            level: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
    /// Resamples that produced a defined kappa.
    pub resamples: usize,
    /// Resamples dropped because kappa was undefined (one category only).
    pub skipped: usize,
}

/// Resample subjects with replacement and take percentiles of kappa.
///
/// Returns `Ok(None)` when the bootstrap is disabled or no resample yields a
/// defined kappa. The category set is fixed from the full sample so every
/// resample is scored on the same table.
pub fn bootstrap_kappa(
    pairs: &[(Score, Score)],
    weighting: Weighting,
    cfg: &BootstrapConfig,
) -> Result<Option<BootstrapInterval>, AgreementError> {
    if !(cfg.level > 0.0 && cfg.level < 1.0) {
        return Err(AgreementError::InvalidLevel(cfg.level));
    }
    if pairs.is_empty() {
        return Err(AgreementError::NoSubjects);
    }
    if cfg.resamples == 0 {
        return Ok(None);
    }
    let categories = resolve_categories(None, pairs.iter().flat_map(|&(a, b)| [a, b]))?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let n = pairs.len();
    let mut sample = Vec::with_capacity(n);
    let mut kappas = Vec::with_capacity(cfg.resamples);
    let mut skipped = 0usize;
    for _ in 0..cfg.resamples {
        sample.clear();
        sample.extend((0..n).map(|_| pairs[rng.gen_range(0..n)]));
        match cohen_kappa(&sample, weighting, Some(&categories))?.kappa {
            Some(k) => kappas.push(k),
            None => skipped += 1,
        }
    }
    if kappas.is_empty() {
        return Ok(None);
    }
    kappas.sort_by(f64::total_cmp);
    let tail = (1.0 - cfg.level) / 2.0;
    Ok(Some(BootstrapInterval {
        level: cfg.level,
        lower: quantile_sorted(&kappas, tail),
        upper: quantile_sorted(&kappas, 1.0 - tail),
        resamples: kappas.len(),
        skipped,
    }))
}

/// Linear interpolation between order statistics.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_pairs() -> Vec<(Score, Score)> {
        let mut pairs = vec![(1, 1); 20];
        pairs.extend(vec![(1, 0); 5]);
        pairs.extend(vec![(0, 1); 10]);
        pairs.extend(vec![(0, 0); 15]);
        pairs
    }

    #[test]
    fn interval_brackets_point_estimate_and_is_deterministic() {
        let cfg = BootstrapConfig {
            resamples: 400,
            seed: 7,
            level: 0.9,
        };
        let a = bootstrap_kappa(&noisy_pairs(), Weighting::Unweighted, &cfg)
            .unwrap()
            .unwrap();
        let b = bootstrap_kappa(&noisy_pairs(), Weighting::Unweighted, &cfg)
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
        assert!(a.lower < 0.4 && 0.4 < a.upper);
        assert_eq!(a.resamples + a.skipped, 400);
    }

    #[test]
    fn zero_resamples_disables_bootstrap() {
        let cfg = BootstrapConfig {
            resamples: 0,
            ..BootstrapConfig::default()
        };
        assert_eq!(
            bootstrap_kappa(&noisy_pairs(), Weighting::Unweighted, &cfg).unwrap(),
            None
        );
    }

    #[test]
    fn quantile_interpolates() {
        let v = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(quantile_sorted(&v, 0.5), 1.5);
        assert_eq!(quantile_sorted(&v, 0.0), 0.0);
        assert_eq!(quantile_sorted(&v, 1.0), 3.0);
    }
}

//! Rank evaluators (human pairs and LLM judges) by agreement and bias.
//!
//! Ordering keys, first difference wins:
//! 1. the primary metric, descending
//! 2. the other agreement metrics (Cohen's kappa, AC1, raw agreement, in
//!    that order, skipping the primary), descending
//! 3. absolute bias index, ascending
//! 4. subjects compared, descending
//! 5. name, ascending
//!
//! An undefined metric sorts after every defined one. Values within
//! `tie_tolerance` are tied on that key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    HumanPair,
    Judge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    CohenKappa,
    Ac1,
    RawAgreement,
}

impl Metric {
    const ALL: [Metric; 3] = [Metric::CohenKappa, Metric::Ac1, Metric::RawAgreement];

    fn value(self, score: &EvaluatorScore) -> Option<f64> {
        match self {
            Metric::CohenKappa => score.cohen_kappa,
            Metric::Ac1 => score.ac1,
            Metric::RawAgreement => score.raw_agreement,
        }
    }

    fn tie_break(self) -> TieBreak {
        match self {
            Metric::CohenKappa => TieBreak::CohenKappa,
            Metric::Ac1 => TieBreak::Ac1,
            Metric::RawAgreement => TieBreak::RawAgreement,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Metric::CohenKappa => "cohen_kappa",
            Metric::Ac1 => "ac1",
            Metric::RawAgreement => "raw_agreement",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorScore {
    pub name: String,
    pub kind: EvaluatorKind,
    pub subjects: usize,
    pub cohen_kappa: Option<f64>,
    pub ac1: Option<f64>,
    pub raw_agreement: Option<f64>,
    pub abs_bias: Option<f64>,
}

/// Which key separated an entry from the one ranked directly above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Ranked first; nothing above it.
    Leader,
    CohenKappa,
    Ac1,
    RawAgreement,
    AbsBias,
    Subjects,
    /// Tied on every metric; ordered by name.
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub primary: Metric,
    pub tie_tolerance: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            primary: Metric::CohenKappa,
            tie_tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEvaluator {
    /// 1-based.
    pub rank: usize,
    pub decided_by: TieBreak,
    /// Judges only: primary metric at least the human-pair mean.
    pub meets_human_baseline: Option<bool>,
    #[serde(flatten)]
    pub score: EvaluatorScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub primary: Metric,
    /// Mean primary metric over human pairs with a defined value.
    pub human_baseline: Option<f64>,
    pub best_judge: Option<String>,
    pub entries: Vec<RankedEvaluator>,
}

#[derive(Debug, Clone, Copy)]
enum Key {
    Metric(Metric),
    AbsBias,
    Subjects,
    Name,
}

fn keys(primary: Metric) -> Vec<Key> {
    let mut keys = vec![Key::Metric(primary)];
    keys.extend(
        Metric::ALL
            .iter()
            .filter(|&&m| m != primary)
            .map(|&m| Key::Metric(m)),
    );
    keys.extend([Key::AbsBias, Key::Subjects, Key::Name]);
    keys
}

/// Defined before undefined; within `tol` is a tie.
fn cmp_optional(a: Option<f64>, b: Option<f64>, tol: f64, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            if (x - y).abs() <= tol {
                Ordering::Equal
            } else if descending {
                y.total_cmp(&x)
            } else {
                x.total_cmp(&y)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare(a: &EvaluatorScore, b: &EvaluatorScore, keys: &[Key], tol: f64) -> (Ordering, TieBreak) {
    for key in keys {
        let (ord, tag) = match *key {
            Key::Metric(m) => (cmp_optional(m.value(a), m.value(b), tol, true), m.tie_break()),
            Key::AbsBias => (cmp_optional(a.abs_bias, b.abs_bias, tol, false), TieBreak::AbsBias),
            Key::Subjects => (b.subjects.cmp(&a.subjects), TieBreak::Subjects),
            Key::Name => (a.name.cmp(&b.name), TieBreak::Name),
        };
        if ord != Ordering::Equal {
            return (ord, tag);
        }
    }
    (Ordering::Equal, TieBreak::Name)
}

/// Order evaluators best-first and record how each position was decided.
pub fn rank_evaluators(scores: &[EvaluatorScore], cfg: &RankingConfig) -> Ranking {
    let keys = keys(cfg.primary);
    let tol = cfg.tie_tolerance.max(0.0);

    // Tolerance ties are not transitive, so use a stable insertion sort
    // instead of `sort_by` (evaluator lists are short).
    let mut ordered: Vec<&EvaluatorScore> = Vec::with_capacity(scores.len());
    for score in scores {
        let pos = ordered
            .iter()
            .position(|existing| compare(score, existing, &keys, tol).0 == Ordering::Less)
            .unwrap_or(ordered.len());
        ordered.insert(pos, score);
    }

    let human_values: Vec<f64> = scores
        .iter()
        .filter(|s| s.kind == EvaluatorKind::HumanPair)
        .filter_map(|s| cfg.primary.value(s))
        .collect();
    let human_baseline = (!human_values.is_empty())
        .then(|| human_values.iter().sum::<f64>() / human_values.len() as f64);

    let entries: Vec<RankedEvaluator> = ordered
        .iter()
        .enumerate()
        .map(|(idx, &score)| {
            let decided_by = if idx == 0 {
                TieBreak::Leader
            } else {
                compare(ordered[idx - 1], score, &keys, tol).1
            };
            let meets_human_baseline = match (score.kind, human_baseline, cfg.primary.value(score)) {
                (EvaluatorKind::Judge, Some(base), Some(v)) => Some(v >= base - tol),
                (EvaluatorKind::Judge, Some(_), None) => Some(false),
                _ => None,
            };
            RankedEvaluator {
                rank: idx + 1,
                decided_by,
                meets_human_baseline,
                score: score.clone(),
            }
        })
        .collect();

    let best_judge = best_judge(&entries).map(|e| e.score.name.clone());
    Ranking {
        primary: cfg.primary,
        human_baseline,
        best_judge,
        entries,
    }
}

/// Highest-ranked LLM judge.
pub fn best_judge(entries: &[RankedEvaluator]) -> Option<&RankedEvaluator> {
    entries
        .iter()
        .find(|e| e.score.kind == EvaluatorKind::Judge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judge(name: &str, kappa: Option<f64>, ac1: f64, raw: f64, bias: f64) -> EvaluatorScore {
        EvaluatorScore {
            name: name.to_string(),
            kind: EvaluatorKind::Judge,
            subjects: 40,
            cohen_kappa: kappa,
            ac1: Some(ac1),
            raw_agreement: Some(raw),
            abs_bias: Some(bias),
        }
    }

    #[test]
    fn keys_skip_primary_among_secondaries() {
        let k = keys(Metric::Ac1);
        assert!(matches!(k[0], Key::Metric(Metric::Ac1)));
        assert!(matches!(k[1], Key::Metric(Metric::CohenKappa)));
        assert!(matches!(k[2], Key::Metric(Metric::RawAgreement)));
        assert_eq!(k.len(), 6);
    }

    #[test]
    fn undefined_kappa_ranks_last() {
        let scores = vec![
            judge("a", None, 0.9, 0.95, 0.0),
            judge("b", Some(0.1), 0.2, 0.5, 0.3),
        ];
        let ranking = rank_evaluators(&scores, &RankingConfig::default());
        assert_eq!(ranking.entries[0].score.name, "b");
        assert_eq!(ranking.entries[1].decided_by, TieBreak::CohenKappa);
    }

    #[test]
    fn bias_breaks_metric_ties_then_name() {
        let scores = vec![
            judge("zeta", Some(0.5), 0.6, 0.8, 0.10),
            judge("alpha", Some(0.5), 0.6, 0.8, 0.10),
            judge("mid", Some(0.5), 0.6, 0.8, 0.02),
        ];
        let ranking = rank_evaluators(&scores, &RankingConfig::default());
        let names: Vec<&str> = ranking.entries.iter().map(|e| e.score.name.as_str()).collect();
        assert_eq!(names, vec!["mid", "alpha", "zeta"]);
        assert_eq!(ranking.entries[1].decided_by, TieBreak::AbsBias);
        assert_eq!(ranking.entries[2].decided_by, TieBreak::Name);
    }

    #[test]
    fn tolerance_merges_near_equal_primaries() {
        let scores = vec![
            judge("a", Some(0.500), 0.50, 0.8, 0.0),
            judge("b", Some(0.501), 0.40, 0.8, 0.0),
        ];
        let strict = rank_evaluators(&scores, &RankingConfig::default());
        assert_eq!(strict.best_judge.as_deref(), Some("b"));

        let loose = rank_evaluators(
            &scores,
            &RankingConfig {
                tie_tolerance: 0.01,
                ..RankingConfig::default()
            },
        );
        assert_eq!(loose.best_judge.as_deref(), Some("a"));
        assert_eq!(loose.entries[1].decided_by, TieBreak::Ac1);
    }
}

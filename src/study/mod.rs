//! Grouped agreement study: humans vs humans, judges vs a human reference.
//!
//! A study binarizes the matrix once, then analyzes the pooled data
//! (`"all"`) and every response/category group separately. Each scope gets
//! pairwise human agreement, multi-rater human agreement, each judge's
//! agreement with the reference and a ranking of all evaluators.

pub mod report;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agreement::{
    bias_index, bootstrap_kappa, cohen_kappa, fleiss_kappa, gwet_ac1, pair_agreement,
    raw_agreement, AgreementError, BiasIndex, BootstrapConfig, BootstrapInterval, CohenKappa,
    FleissKappa, GwetAc1, RawAgreement, Weighting,
};
use crate::binarize::{BinarizeError, Binarizer, Verdict};
use crate::comparator::{rank_evaluators, EvaluatorKind, EvaluatorScore, Ranking, RankingConfig};
use crate::ratings::{LoadOptions, RatingMatrix, RatingsError, Score};

pub use report::{fmt_opt, hash_input, render_report_markdown};

/// Label of the pooled scope.
pub const POOLED_GROUP: &str = "all";

#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Ratings(#[from] RatingsError),
    #[error(transparent)]
    Binarize(#[from] BinarizeError),
    #[error(transparent)]
    Agreement(#[from] AgreementError),
    #[error("unknown rater: {0}")]
    UnknownRater(String),
    #[error("rater {0} is listed as both human and judge")]
    RaterInBothRoles(String),
    #[error("rater {0} is listed more than once")]
    DuplicateRater(String),
    #[error("no human raters to compare against")]
    NoHumans,
}

/// How a judge's reference verdict is built from the human raters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Majority verdict of the humans who rated the item; split votes are
    /// left out of the comparison.
    #[default]
    Majority,
    /// Compare with each human separately and average the coefficients.
    MeanPairwise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub input: LoadOptions,
    pub binarizer: Binarizer,
    /// Human raters; empty means every rater not listed as a judge.
    pub humans: Vec<String>,
    pub judges: Vec<String>,
    pub reference: ReferenceMode,
    pub ranking: RankingConfig,
    /// Confidence level for AC1 intervals.
    pub conf_level: f64,
    pub bootstrap: BootstrapConfig,
    /// Weighted kappa on the raw ordinal scores of each pair; `None` skips it.
    pub ordinal_weighting: Option<Weighting>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            input: LoadOptions::default(),
            binarizer: Binarizer::default(),
            humans: Vec::new(),
            judges: Vec::new(),
            reference: ReferenceMode::Majority,
            ranking: RankingConfig::default(),
            conf_level: 0.95,
            bootstrap: BootstrapConfig::default(),
            ordinal_weighting: Some(Weighting::Quadratic),
        }
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<StudyConfig, StudyError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAgreement {
    pub rater_a: String,
    pub rater_b: String,
    pub subjects: usize,
    pub cohen: CohenKappa,
    pub ac1: Option<f64>,
    pub raw_agreement: f64,
    /// Positive when `rater_a` accepts more often.
    pub bias: BiasIndex,
    /// Kappa on the ordinal scores with `ordinal_weighting`.
    pub weighted_kappa: Option<f64>,
    pub kappa_ci: Option<BootstrapInterval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiRaterAgreement {
    pub raters: Vec<String>,
    pub fleiss: Option<FleissKappa>,
    pub ac1: Option<GwetAc1>,
    pub raw: Option<RawAgreement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeAgreement {
    pub judge: String,
    pub reference: ReferenceMode,
    pub subjects: usize,
    pub cohen_kappa: Option<f64>,
    pub ac1: Option<f64>,
    pub raw_agreement: Option<f64>,
    /// Positive when the judge accepts more often than the reference.
    pub bias_index: Option<f64>,
    pub abs_bias_index: Option<f64>,
    /// Majority reference only.
    pub kappa_ci: Option<BootstrapInterval>,
    pub per_human: Vec<PairAgreement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: String,
    pub subjects: usize,
    pub human_pairs: Vec<PairAgreement>,
    pub humans: Option<MultiRaterAgreement>,
    pub judges: Vec<JudgeAgreement>,
    /// Items whose human majority was split (majority reference only).
    pub reference_ties: usize,
    pub ranking: Ranking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReport {
    pub input_hash: Option<String>,
    pub binarizer: Binarizer,
    pub humans: Vec<String>,
    pub judges: Vec<String>,
    pub reference: ReferenceMode,
    /// Best judge on the pooled data.
    pub best_judge: Option<String>,
    pub groups: Vec<GroupReport>,
}

impl StudyReport {
    pub fn group(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group == name)
    }

    pub fn pooled(&self) -> Option<&GroupReport> {
        self.group(POOLED_GROUP)
    }
}

struct Roles {
    humans: Vec<String>,
    judges: Vec<String>,
}

fn resolve_roles(matrix: &RatingMatrix, cfg: &StudyConfig) -> Result<Roles, StudyError> {
    for name in cfg.humans.iter().chain(&cfg.judges) {
        if matrix.rater_index(name).is_none() {
            return Err(StudyError::UnknownRater(name.clone()));
        }
    }
    for list in [&cfg.humans, &cfg.judges] {
        let mut seen = HashSet::new();
        if let Some(dup) = list.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(StudyError::DuplicateRater(dup.clone()));
        }
    }
    let judge_set: HashSet<&str> = cfg.judges.iter().map(String::as_str).collect();
    if let Some(both) = cfg.humans.iter().find(|h| judge_set.contains(h.as_str())) {
        return Err(StudyError::RaterInBothRoles(both.clone()));
    }
    let humans: Vec<String> = if cfg.humans.is_empty() {
        matrix
            .raters()
            .iter()
            .filter(|r| !judge_set.contains(r.as_str()))
            .cloned()
            .collect()
    } else {
        cfg.humans.clone()
    };
    if humans.is_empty() {
        return Err(StudyError::NoHumans);
    }
    Ok(Roles {
        humans,
        judges: cfg.judges.clone(),
    })
}

/// Run the full study on an ordinal matrix.
pub fn run_study(matrix: &RatingMatrix, cfg: &StudyConfig) -> Result<StudyReport, StudyError> {
    let roles = resolve_roles(matrix, cfg)?;
    let binary = cfg.binarizer.apply(matrix)?;

    let mut groups = vec![analyze_scope(POOLED_GROUP, matrix, &binary, &roles, cfg)?];
    for group in matrix.groups() {
        let ordinal = matrix.filter_group(&group);
        let bin = binary.filter_group(&group);
        groups.push(analyze_scope(&group, &ordinal, &bin, &roles, cfg)?);
    }

    let best_judge = groups
        .first()
        .and_then(|g| g.ranking.best_judge.clone());
    Ok(StudyReport {
        input_hash: None,
        binarizer: cfg.binarizer.clone(),
        humans: roles.humans,
        judges: roles.judges,
        reference: cfg.reference,
        best_judge,
        groups,
    })
}

fn analyze_scope(
    name: &str,
    ordinal: &RatingMatrix,
    binary: &RatingMatrix,
    roles: &Roles,
    cfg: &StudyConfig,
) -> Result<GroupReport, StudyError> {
    debug!(group = name, items = binary.n_items(), "analyzing scope");

    let mut human_pairs = Vec::new();
    for (i, a) in roles.humans.iter().enumerate() {
        for b in &roles.humans[i + 1..] {
            if let Some(pair) = analyze_pair(a, b, ordinal, binary, cfg)? {
                human_pairs.push(pair);
            }
        }
    }

    let humans = if roles.humans.len() >= 2 {
        Some(multi_rater(binary, &roles.humans, cfg)?)
    } else {
        None
    };

    let (reference, reference_ties) = majority_reference(binary, &roles.humans)?;
    if cfg.reference == ReferenceMode::Majority && reference_ties > 0 {
        warn!(
            group = name,
            ties = reference_ties,
            "human majority split; items excluded from judge comparison"
        );
    }

    let mut judges = Vec::new();
    for judge in &roles.judges {
        let mut per_human = Vec::new();
        for human in &roles.humans {
            if let Some(pair) = analyze_pair(judge, human, ordinal, binary, cfg)? {
                per_human.push(pair);
            }
        }
        let agreement = match cfg.reference {
            ReferenceMode::Majority => {
                judge_vs_majority(judge, binary, &reference, per_human, cfg)?
            }
            ReferenceMode::MeanPairwise => judge_vs_each(judge, per_human),
        };
        if agreement.subjects == 0 {
            warn!(group = name, judge = %judge, "judge shares no items with the reference");
        }
        judges.push(agreement);
    }

    let mut scores: Vec<EvaluatorScore> = human_pairs
        .iter()
        .map(|p| EvaluatorScore {
            name: format!("{} vs {}", p.rater_a, p.rater_b),
            kind: EvaluatorKind::HumanPair,
            subjects: p.subjects,
            cohen_kappa: p.cohen.kappa,
            ac1: p.ac1,
            raw_agreement: Some(p.raw_agreement),
            abs_bias: Some(p.bias.abs_bias_index),
        })
        .collect();
    scores.extend(judges.iter().filter(|j| j.subjects > 0).map(|j| EvaluatorScore {
        name: j.judge.clone(),
        kind: EvaluatorKind::Judge,
        subjects: j.subjects,
        cohen_kappa: j.cohen_kappa,
        ac1: j.ac1,
        raw_agreement: j.raw_agreement,
        abs_bias: j.abs_bias_index,
    }));
    let ranking = rank_evaluators(&scores, &cfg.ranking);

    Ok(GroupReport {
        group: name.to_string(),
        subjects: binary.n_items(),
        human_pairs,
        humans,
        judges,
        reference_ties: if cfg.reference == ReferenceMode::Majority {
            reference_ties
        } else {
            0
        },
        ranking,
    })
}

fn analyze_pair(
    rater_a: &str,
    rater_b: &str,
    ordinal: &RatingMatrix,
    binary: &RatingMatrix,
    cfg: &StudyConfig,
) -> Result<Option<PairAgreement>, StudyError> {
    let pairs = binary.pairs(rater_a, rater_b)?;
    if pairs.is_empty() {
        debug!(rater_a, rater_b, "no shared items");
        return Ok(None);
    }
    let weighted_kappa = match cfg.ordinal_weighting {
        Some(weighting) => {
            let ordinal_pairs = ordinal.pairs(rater_a, rater_b)?;
            let scale: Option<Vec<Score>> = cfg.binarizer.scale.map(|(lo, hi)| (lo..=hi).collect());
            cohen_kappa(&ordinal_pairs, weighting, scale.as_deref())?.kappa
        }
        None => None,
    };
    let summary = binary_summary(&pairs, cfg)?;
    warn_undefined(rater_a, rater_b, &summary);
    Ok(Some(PairAgreement {
        rater_a: rater_a.to_string(),
        rater_b: rater_b.to_string(),
        subjects: pairs.len(),
        cohen: summary.cohen,
        ac1: summary.ac1,
        raw_agreement: summary.raw,
        bias: summary.bias,
        weighted_kappa,
        kappa_ci: summary.kappa_ci,
    }))
}

struct BinarySummary {
    cohen: CohenKappa,
    ac1: Option<f64>,
    raw: f64,
    bias: BiasIndex,
    kappa_ci: Option<BootstrapInterval>,
}

fn binary_summary(pairs: &[(Score, Score)], cfg: &StudyConfig) -> Result<BinarySummary, StudyError> {
    let categories = Verdict::categories();
    let cohen = cohen_kappa(pairs, Weighting::Unweighted, Some(&categories))?;
    let matrix = matrix_from_pairs(pairs)?;
    let ac1 = gwet_ac1(&matrix, Some(&categories), cfg.conf_level)?.coefficient;
    Ok(BinarySummary {
        cohen,
        ac1,
        raw: pair_agreement(pairs)?,
        bias: bias_index(pairs)?,
        kappa_ci: bootstrap_kappa(pairs, Weighting::Unweighted, &cfg.bootstrap)?,
    })
}

fn warn_undefined(rater_a: &str, rater_b: &str, summary: &BinarySummary) {
    if summary.cohen.kappa.is_none() {
        warn!(rater_a, rater_b, "kappa undefined: chance agreement is 1");
    }
    if summary.ac1.is_none() {
        warn!(rater_a, rater_b, "AC1 undefined: chance agreement is 1");
    }
}

fn matrix_from_pairs(pairs: &[(Score, Score)]) -> Result<RatingMatrix, RatingsError> {
    let mut m = RatingMatrix::new();
    for (i, &(a, b)) in pairs.iter().enumerate() {
        let item = i.to_string();
        m.insert(&item, None, "a", a)?;
        m.insert(&item, None, "b", b)?;
    }
    Ok(m)
}

fn multi_rater(
    binary: &RatingMatrix,
    humans: &[String],
    cfg: &StudyConfig,
) -> Result<MultiRaterAgreement, StudyError> {
    let subset = binary.select_raters(humans)?;
    let categories = Verdict::categories();
    let fleiss = match fleiss_kappa(&subset, Some(&categories)) {
        Ok(k) => Some(k),
        Err(AgreementError::TooFewRaters(_) | AgreementError::NoSubjects) => None,
        Err(e) => return Err(e.into()),
    };
    let ac1 = match gwet_ac1(&subset, Some(&categories), cfg.conf_level) {
        Ok(a) => Some(a),
        Err(AgreementError::NoSubjects) => None,
        Err(e) => return Err(e.into()),
    };
    let raw = match raw_agreement(&subset) {
        Ok(r) => Some(r),
        Err(AgreementError::NoSubjects) => None,
        Err(e) => return Err(e.into()),
    };
    if fleiss.as_ref().is_some_and(|f| f.kappa.is_none()) {
        warn!(raters = humans.len(), "Fleiss kappa undefined: chance agreement is 1");
    }
    if ac1.as_ref().is_some_and(|a| a.coefficient.is_none()) {
        warn!(raters = humans.len(), "multi-rater AC1 undefined: chance agreement is 1");
    }
    Ok(MultiRaterAgreement {
        raters: humans.to_vec(),
        fleiss,
        ac1,
        raw,
    })
}

/// Majority verdict per row (aligned with `binary.rows()`) and the number of
/// rows whose human votes were split evenly.
pub fn majority_reference(
    binary: &RatingMatrix,
    humans: &[String],
) -> Result<(Vec<Option<Score>>, usize), StudyError> {
    let columns = humans
        .iter()
        .map(|h| {
            binary
                .rater_index(h)
                .ok_or_else(|| StudyError::UnknownRater(h.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut ties = 0usize;
    let reference = binary
        .rows()
        .iter()
        .map(|row| {
            let votes: Vec<Score> = columns.iter().filter_map(|&c| row.scores[c]).collect();
            if votes.is_empty() {
                return None;
            }
            let accepts = votes.iter().filter(|&&v| v == Verdict::ACCEPT_SCORE).count();
            let rejects = votes.len() - accepts;
            match accepts.cmp(&rejects) {
                std::cmp::Ordering::Greater => Some(Verdict::ACCEPT_SCORE),
                std::cmp::Ordering::Less => Some(Verdict::REJECT_SCORE),
                std::cmp::Ordering::Equal => {
                    ties += 1;
                    None
                }
            }
        })
        .collect();
    Ok((reference, ties))
}

fn judge_vs_majority(
    judge: &str,
    binary: &RatingMatrix,
    reference: &[Option<Score>],
    per_human: Vec<PairAgreement>,
    cfg: &StudyConfig,
) -> Result<JudgeAgreement, StudyError> {
    let column = binary.column(judge)?;
    let pairs: Vec<(Score, Score)> = column
        .iter()
        .zip(reference)
        .filter_map(|(j, r)| Some(((*j)?, (*r)?)))
        .collect();

    let mut out = JudgeAgreement {
        judge: judge.to_string(),
        reference: ReferenceMode::Majority,
        subjects: pairs.len(),
        cohen_kappa: None,
        ac1: None,
        raw_agreement: None,
        bias_index: None,
        abs_bias_index: None,
        kappa_ci: None,
        per_human,
    };
    if pairs.is_empty() {
        return Ok(out);
    }
    let summary = binary_summary(&pairs, cfg)?;
    warn_undefined(judge, "human majority", &summary);
    out.cohen_kappa = summary.cohen.kappa;
    out.ac1 = summary.ac1;
    out.raw_agreement = Some(summary.raw);
    out.bias_index = Some(summary.bias.bias_index);
    out.abs_bias_index = Some(summary.bias.abs_bias_index);
    out.kappa_ci = summary.kappa_ci;
    Ok(out)
}

fn judge_vs_each(judge: &str, per_human: Vec<PairAgreement>) -> JudgeAgreement {
    fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
        let defined: Vec<f64> = values.flatten().collect();
        (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64)
    }
    let bias = mean(per_human.iter().map(|p| Some(p.bias.bias_index)));
    JudgeAgreement {
        judge: judge.to_string(),
        reference: ReferenceMode::MeanPairwise,
        subjects: per_human.iter().map(|p| p.subjects).min().unwrap_or(0),
        cohen_kappa: mean(per_human.iter().map(|p| p.cohen.kappa)),
        ac1: mean(per_human.iter().map(|p| p.ac1)),
        raw_agreement: mean(per_human.iter().map(|p| Some(p.raw_agreement))),
        bias_index: bias,
        abs_bias_index: mean(per_human.iter().map(|p| Some(p.bias.abs_bias_index))),
        kappa_ci: None,
        per_human,
    }
}

#![forbid(unsafe_code)]

//! # accord-harness
//!
//! Inter-rater reliability for human and LLM judges.
//!
//! Ordinal ratings (for example 1..5 quality scores) are loaded into a
//! [`RatingMatrix`], binarized into accept/reject verdicts and scored with
//! chance-corrected agreement coefficients: Cohen's kappa, Fleiss' kappa and
//! Gwet's AC1, next to raw agreement and the bias index. Human rater pairs
//! and LLM judges are then ranked against each other so the judge that best
//! reproduces the human reference can be named, per response category and
//! pooled.
//!
//! [`sample_size`] answers the planning question: how many items must be
//! rated to detect or pin down a given kappa.

pub mod agreement;
pub mod binarize;
pub mod comparator;
pub mod ratings;
pub mod sample_size;
pub mod study;

pub use agreement::{
    bias_index, cohen_kappa, fleiss_kappa, gwet_ac1, raw_agreement, AgreementError, CohenKappa,
    FleissKappa, GwetAc1, Weighting,
};
pub use binarize::{Binarizer, Direction, Verdict};
pub use comparator::{rank_evaluators, EvaluatorKind, EvaluatorScore, Metric, Ranking, TieBreak};
pub use ratings::{load_ratings, Layout, LoadOptions, RatingMatrix, Score};
pub use sample_size::{power_binary, precision_binary, PowerRequest, PrecisionRequest};
pub use study::{run_study, StudyConfig, StudyError, StudyReport};

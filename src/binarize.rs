//! Collapse ordinal ratings into accept/reject verdicts.

use serde::{Deserialize, Serialize};

use crate::ratings::{RatingMatrix, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Reject,
    Accept,
}

impl Verdict {
    pub const REJECT_SCORE: Score = 0;
    pub const ACCEPT_SCORE: Score = 1;

    pub fn as_score(self) -> Score {
        match self {
            Verdict::Reject => Self::REJECT_SCORE,
            Verdict::Accept => Self::ACCEPT_SCORE,
        }
    }

    pub fn from_score(score: Score) -> Option<Self> {
        match score {
            Self::REJECT_SCORE => Some(Verdict::Reject),
            Self::ACCEPT_SCORE => Some(Verdict::Accept),
            _ => None,
        }
    }

    /// Category set of every binarized matrix, in score order.
    pub fn categories() -> [Score; 2] {
        [Self::REJECT_SCORE, Self::ACCEPT_SCORE]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Accept when `score >= threshold`.
    #[default]
    AtLeast,
    /// Accept when `score <= threshold` (reverse-keyed scales).
    AtMost,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BinarizeError {
    #[error("score {score} outside rating scale {min}..={max}")]
    OutOfScale { score: Score, min: Score, max: Score },
    #[error("invalid scale: min {min} > max {max}")]
    InvalidScale { min: Score, max: Score },
    #[error("threshold {threshold} outside rating scale {min}..={max}")]
    ThresholdOutOfScale { threshold: Score, min: Score, max: Score },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binarizer {
    pub threshold: Score,
    pub direction: Direction,
    /// Inclusive `(min, max)`; scores outside it are rejected as input errors.
    pub scale: Option<(Score, Score)>,
}

impl Default for Binarizer {
    fn default() -> Self {
        Self {
            threshold: 4,
            direction: Direction::AtLeast,
            scale: Some((1, 5)),
        }
    }
}

impl Binarizer {
    pub fn new(threshold: Score) -> Self {
        Self {
            threshold,
            direction: Direction::AtLeast,
            scale: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_scale(mut self, min: Score, max: Score) -> Self {
        self.scale = Some((min, max));
        self
    }

    pub fn validate(&self) -> Result<(), BinarizeError> {
        if let Some((min, max)) = self.scale {
            if min > max {
                return Err(BinarizeError::InvalidScale { min, max });
            }
            if self.threshold < min || self.threshold > max {
                return Err(BinarizeError::ThresholdOutOfScale {
                    threshold: self.threshold,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn verdict(&self, score: Score) -> Result<Verdict, BinarizeError> {
        if let Some((min, max)) = self.scale {
            if score < min || score > max {
                return Err(BinarizeError::OutOfScale { score, min, max });
            }
        }
        let accept = match self.direction {
            Direction::AtLeast => score >= self.threshold,
            Direction::AtMost => score <= self.threshold,
        };
        Ok(if accept {
            Verdict::Accept
        } else {
            Verdict::Reject
        })
    }

    /// Binarize every present score; missing cells stay missing.
    pub fn apply(&self, matrix: &RatingMatrix) -> Result<RatingMatrix, BinarizeError> {
        self.validate()?;
        matrix.map_scores(|score| self.verdict(score).map(Verdict::as_score))
    }
}

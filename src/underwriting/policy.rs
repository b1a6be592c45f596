use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{LoanError, Result};
use crate::underwriting::CreditScore;

/// rejection reason for scores under the review floor
pub const LOW_CREDIT_SCORE: &str = "low credit score";

/// rejection reason for a lost draw inside the review band
pub const REVIEW_DECLINED: &str = "credit review declined";

/// score thresholds driving the approval decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingPolicy {
    /// scores at or above this are approved outright
    pub auto_approve_score: u16,
    /// scores under this are rejected outright
    pub review_floor_score: u16,
    /// approval odds for scores in [floor, auto_approve)
    pub review_approval_probability: f64,
}

impl Default for UnderwritingPolicy {
    fn default() -> Self {
        Self {
            auto_approve_score: 700,
            review_floor_score: 600,
            review_approval_probability: 0.5,
        }
    }
}

/// final outcome of underwriting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UnderwritingOutcome {
    Approved,
    Rejected { reason: String },
}

/// how the outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// threshold decided alone
    Automatic,
    /// score fell in the review band and a random draw decided
    ReviewDraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderwritingDecision {
    pub score: CreditScore,
    pub outcome: UnderwritingOutcome,
    pub basis: DecisionBasis,
}

impl UnderwritingDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self.outcome, UnderwritingOutcome::Approved)
    }

    pub fn label(&self) -> &'static str {
        match self.outcome {
            UnderwritingOutcome::Approved => "approved",
            UnderwritingOutcome::Rejected { .. } => "rejected",
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.outcome {
            UnderwritingOutcome::Rejected { reason } => Some(reason),
            UnderwritingOutcome::Approved => None,
        }
    }
}

impl UnderwritingPolicy {
    /// policy whose review band never approves
    pub fn strict() -> Self {
        Self {
            review_approval_probability: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.review_floor_score > self.auto_approve_score {
            return Err(LoanError::InvalidConfiguration {
                message: format!(
                    "review floor {} above auto-approve score {}",
                    self.review_floor_score, self.auto_approve_score
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.review_approval_probability) {
            return Err(LoanError::InvalidConfiguration {
                message: format!(
                    "review approval probability {} outside [0, 1]",
                    self.review_approval_probability
                ),
            });
        }
        Ok(())
    }

    /// whether the score needs a draw to be decided
    pub fn in_review_band(&self, score: CreditScore) -> bool {
        score.value() >= self.review_floor_score && score.value() < self.auto_approve_score
    }

    /// decide an application; the rng is only consulted inside the review band
    pub fn decide<R: Rng + ?Sized>(&self, score: CreditScore, rng: &mut R) -> UnderwritingDecision {
        let (outcome, basis) = if score.value() >= self.auto_approve_score {
            (UnderwritingOutcome::Approved, DecisionBasis::Automatic)
        } else if self.in_review_band(score) {
            let outcome = if rng.gen_bool(self.review_approval_probability) {
                UnderwritingOutcome::Approved
            } else {
                UnderwritingOutcome::Rejected {
                    reason: REVIEW_DECLINED.to_string(),
                }
            };
            (outcome, DecisionBasis::ReviewDraw)
        } else {
            (
                UnderwritingOutcome::Rejected {
                    reason: LOW_CREDIT_SCORE.to_string(),
                },
                DecisionBasis::Automatic,
            )
        };

        UnderwritingDecision {
            score,
            outcome,
            basis,
        }
    }
}

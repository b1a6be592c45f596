pub mod policy;
pub mod scorer;

pub use policy::{
    DecisionBasis, UnderwritingDecision, UnderwritingOutcome, UnderwritingPolicy,
    LOW_CREDIT_SCORE, REVIEW_DECLINED,
};
pub use scorer::{CreditScore, CreditScorer, FixedCreditScorer, RandomCreditScorer};

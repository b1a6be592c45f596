use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::application::LoanApplication;

/// credit score bounded to the bureau range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreditScore(u16);

impl CreditScore {
    pub const MIN: CreditScore = CreditScore(300);
    pub const MAX: CreditScore = CreditScore(850);

    /// values outside the range are clamped
    pub fn new(value: u16) -> Self {
        CreditScore(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for CreditScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// source of credit scores for loan applications
pub trait CreditScorer: Send + Sync {
    fn score(&self, application: &LoanApplication) -> CreditScore;
}

/// simulated bureau: uniform score across the full range
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCreditScorer;

impl CreditScorer for RandomCreditScorer {
    fn score(&self, _application: &LoanApplication) -> CreditScore {
        let value = rand::thread_rng().gen_range(CreditScore::MIN.0..=CreditScore::MAX.0);
        CreditScore(value)
    }
}

/// always returns the same score
#[derive(Debug, Clone, Copy)]
pub struct FixedCreditScorer(pub CreditScore);

impl FixedCreditScorer {
    pub fn new(value: u16) -> Self {
        FixedCreditScorer(CreditScore::new(value))
    }
}

impl CreditScorer for FixedCreditScorer {
    fn score(&self, _application: &LoanApplication) -> CreditScore {
        self.0
    }
}

impl<S: CreditScorer + ?Sized> CreditScorer for Box<S> {
    fn score(&self, application: &LoanApplication) -> CreditScore {
        (**self).score(application)
    }
}

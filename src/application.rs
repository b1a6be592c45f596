use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ApplicationLimits;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, CurrencyCode};

/// loan application as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub account_id: AccountId,
    pub amount: Money,
    pub currency: CurrencyCode,
    /// annual rate
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
}

impl LoanApplication {
    /// Check the request-level constraints the calling layer is expected to enforce
    /// before handing the application to the engine.
    pub fn validate(&self, limits: &ApplicationLimits) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LoanError::InvalidApplication {
                field: "amount",
                message: format!("must be positive, got {}", self.amount),
            });
        }

        if self.interest_rate < limits.min_interest_rate
            || self.interest_rate > limits.max_interest_rate
        {
            return Err(LoanError::InvalidApplication {
                field: "interest_rate",
                message: format!(
                    "{} outside [{}, {}]",
                    self.interest_rate, limits.min_interest_rate, limits.max_interest_rate
                ),
            });
        }

        if self.term_months < limits.min_term_months || self.term_months > limits.max_term_months {
            return Err(LoanError::InvalidApplication {
                field: "term_months",
                message: format!(
                    "{} outside [{}, {}]",
                    self.term_months, limits.min_term_months, limits.max_term_months
                ),
            });
        }

        if !self.currency.is_well_formed() {
            return Err(LoanError::InvalidApplication {
                field: "currency",
                message: format!("'{}' is not a three-letter currency code", self.currency),
            });
        }

        Ok(())
    }
}

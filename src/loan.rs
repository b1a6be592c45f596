use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::LoanApplication;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, CurrencyCode, LoanId, LoanStatus, PaymentId};
use crate::underwriting::CreditScore;

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub account_id: AccountId,
    pub amount: Money,
    pub currency: CurrencyCode,
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
    pub status: LoanStatus,
    /// set once at application time
    pub credit_score: Option<CreditScore>,
    pub created_at: DateTime<Utc>,
    pub last_status_change: DateTime<Utc>,
}

impl Loan {
    /// new pending loan for an application
    pub fn from_application(application: &LoanApplication, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: application.account_id,
            amount: application.amount,
            currency: application.currency.clone(),
            interest_rate: application.interest_rate,
            term_months: application.term_months,
            start_date: application.start_date,
            status: LoanStatus::Pending,
            credit_score: None,
            created_at,
            last_status_change: created_at,
        }
    }

    /// record the score; a second assignment is a state conflict
    pub fn assign_credit_score(&mut self, score: CreditScore) -> Result<()> {
        if self.credit_score.is_some() {
            return Err(LoanError::CreditScoreAlreadySet { loan_id: self.id });
        }
        self.credit_score = Some(score);
        Ok(())
    }

    /// move along the lifecycle, refusing backward or skipping moves
    pub fn transition(&mut self, next: LoanStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LoanError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.last_status_change = at;
        Ok(())
    }
}

/// installment record owned by a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanPayment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    /// 1-based position in the schedule
    pub sequence: u32,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl LoanPayment {
    pub fn new(
        loan_id: LoanId,
        sequence: u32,
        amount: Money,
        due_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence,
            amount,
            due_date,
            is_paid: false,
            payment_date: None,
            created_at,
        }
    }

    /// error if the installment was already settled
    pub fn ensure_unpaid(&self) -> Result<()> {
        match (self.is_paid, self.payment_date) {
            (true, Some(paid_on)) => Err(LoanError::AlreadyPaid {
                payment_id: self.id,
                paid_on,
            }),
            (true, None) => Err(LoanError::AlreadyPaid {
                payment_id: self.id,
                paid_on: self.due_date,
            }),
            _ => Ok(()),
        }
    }

    /// unpaid -> paid, exactly once
    pub fn mark_paid(&mut self, paid_on: NaiveDate) -> Result<()> {
        self.ensure_unpaid()?;
        self.is_paid = true;
        self.payment_date = Some(paid_on);
        Ok(())
    }
}

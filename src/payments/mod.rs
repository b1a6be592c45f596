pub mod amortization;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::loan::LoanPayment;
use crate::types::LoanId;

pub use amortization::{level_payment, AmortizationSchedule, ScheduledPayment};

/// turn a generated schedule into installment records for a loan
pub fn installments_from_schedule(
    loan_id: LoanId,
    schedule: &AmortizationSchedule,
    created_at: DateTime<Utc>,
) -> Vec<LoanPayment> {
    let amount = schedule.installment_amount();
    schedule
        .payments
        .iter()
        .map(|scheduled| {
            LoanPayment::new(
                loan_id,
                scheduled.payment_number,
                amount,
                scheduled.due_date,
                created_at,
            )
        })
        .collect()
}

/// repayment progress across a loan's installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentProgress {
    pub installments_paid: u32,
    pub installments_remaining: u32,
    pub amount_paid: Money,
    pub amount_outstanding: Money,
    pub next_due: Option<NaiveDate>,
}

impl InstallmentProgress {
    /// installments are expected in due-date order
    pub fn from_installments(installments: &[LoanPayment]) -> Self {
        let (paid, unpaid): (Vec<&LoanPayment>, Vec<&LoanPayment>) =
            installments.iter().partition(|p| p.is_paid);

        Self {
            installments_paid: paid.len() as u32,
            installments_remaining: unpaid.len() as u32,
            amount_paid: paid.iter().map(|p| p.amount).sum(),
            amount_outstanding: unpaid.iter().map(|p| p.amount).sum(),
            next_due: unpaid.iter().map(|p| p.due_date).min(),
        }
    }

    /// true only when there is at least one installment and none is left
    pub fn is_fully_paid(&self) -> bool {
        self.installments_paid > 0 && self.installments_remaining == 0
    }
}

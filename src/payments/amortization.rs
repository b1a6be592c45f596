use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{compound_factor, Money, Rate};
use crate::errors::{LoanError, Result};

/// one period of an amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub due_date: NaiveDate,
    pub beginning_balance: Money,
    /// level payment for the loan
    pub payment_amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub ending_balance: Money,
    pub cumulative_interest: Money,
    pub cumulative_principal: Money,
}

/// fixed-payment (annuity) amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
    /// unrounded level payment
    pub level_payment: Money,
    pub payments: Vec<ScheduledPayment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl AmortizationSchedule {
    /// Build the annuity schedule. Each period's interest is charged on the
    /// remaining principal; the final period retires whatever principal is left
    /// so the balance closes at exactly zero.
    pub fn generate(
        principal: Money,
        interest_rate: Rate,
        term_months: u32,
        start_date: NaiveDate,
    ) -> Result<Self> {
        if term_months == 0 {
            return Err(LoanError::InvalidApplication {
                field: "term_months",
                message: "schedule needs at least one period".to_string(),
            });
        }

        let monthly_rate = interest_rate.monthly_rate().as_decimal();
        let level_payment = level_payment(principal, interest_rate, term_months)?;
        let total_payment = level_payment
            .as_decimal()
            .checked_mul(Decimal::from(term_months))
            .map(Money::from_decimal)
            .ok_or_else(|| out_of_range(principal, interest_rate, term_months))?;

        let mut payments = Vec::with_capacity(term_months as usize);
        let mut remaining = principal;
        let mut cumulative_interest = Money::ZERO;
        let mut cumulative_principal = Money::ZERO;

        for period in 1..=term_months {
            let due_date = add_months(start_date, period)?;
            let interest_portion = remaining
                .as_decimal()
                .checked_mul(monthly_rate)
                .map(Money::from_decimal)
                .ok_or_else(|| out_of_range(principal, interest_rate, term_months))?;
            let principal_portion = if period == term_months {
                remaining
            } else {
                level_payment - interest_portion
            };

            cumulative_interest += interest_portion;
            cumulative_principal += principal_portion;
            let ending_balance = remaining - principal_portion;

            payments.push(ScheduledPayment {
                payment_number: period,
                due_date,
                beginning_balance: remaining,
                payment_amount: level_payment,
                principal_portion,
                interest_portion,
                ending_balance,
                cumulative_interest,
                cumulative_principal,
            });

            remaining = ending_balance;
        }

        Ok(Self {
            principal,
            interest_rate,
            term_months,
            start_date,
            level_payment,
            payments,
            total_interest: cumulative_interest,
            total_payment,
        })
    }

    /// level payment at the persisted (cent) precision
    pub fn installment_amount(&self) -> Money {
        self.level_payment.round_to_cents()
    }

    pub fn get_payment(&self, payment_number: u32) -> Option<&ScheduledPayment> {
        payment_number
            .checked_sub(1)
            .and_then(|index| self.payments.get(index as usize))
    }

    /// principal still owed after the given number of installments
    pub fn balance_after_payment(&self, payment_number: u32) -> Money {
        self.get_payment(payment_number)
            .map(|p| p.ending_balance)
            .unwrap_or(self.principal)
    }

    pub fn first_due_date(&self) -> Option<NaiveDate> {
        self.payments.first().map(|p| p.due_date)
    }

    pub fn maturity_date(&self) -> Option<NaiveDate> {
        self.payments.last().map(|p| p.due_date)
    }
}

/// M = P * i * (1 + i)^n / ((1 + i)^n - 1), with i the monthly rate.
/// Terms whose growth factor leaves the decimal range are refused.
pub fn level_payment(principal: Money, annual_rate: Rate, months: u32) -> Result<Money> {
    if months == 0 {
        return Ok(principal);
    }

    let monthly_rate = annual_rate.monthly_rate().as_decimal();
    if monthly_rate.is_zero() {
        return Ok(principal / Decimal::from(months));
    }

    compound_factor(monthly_rate, months)
        .and_then(|compound| {
            let numerator = principal
                .as_decimal()
                .checked_mul(monthly_rate)?
                .checked_mul(compound)?;
            numerator.checked_div(compound.checked_sub(Decimal::ONE)?)
        })
        .map(Money::from_decimal)
        .ok_or_else(|| out_of_range(principal, annual_rate, months))
}

fn out_of_range(principal: Money, annual_rate: Rate, months: u32) -> LoanError {
    LoanError::InvalidApplication {
        field: "term_months",
        message: format!(
            "{months} months at {annual_rate} on {principal} exceeds the representable range"
        ),
    }
}

/// calendar-month addition, clamped to the last day of shorter months
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LoanError::InvalidApplication {
            field: "start_date",
            message: format!("{date} plus {months} months is out of range"),
        })
}

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::errors::LoanError;
use crate::loan::{Loan, LoanPayment};
use crate::types::{AccountId, LoanId, LoanStatus, PaymentId};

/// Storage abstraction for loans and their installments.
pub trait LoanRepository: Send + Sync {
    fn insert_loan(&self, loan: Loan) -> Result<Loan, RepositoryError>;

    /// Store `loan` only while the stored status is still `expected`.
    /// Returns whether the write happened.
    fn transition_loan(&self, loan: &Loan, expected: LoanStatus) -> Result<bool, RepositoryError>;

    fn fetch_loan(&self, loan_id: LoanId) -> Result<Option<Loan>, RepositoryError>;
    fn loans_for_account(&self, account_id: AccountId) -> Result<Vec<Loan>, RepositoryError>;

    /// Store the full installment set together with the loan's new status.
    /// Either everything is visible afterwards or nothing is.
    fn activate_with_schedule(
        &self,
        loan: &Loan,
        payments: Vec<LoanPayment>,
    ) -> Result<(), RepositoryError>;

    /// Undo `activate_with_schedule`: drop the installments and store `loan` as given.
    fn revert_schedule(&self, loan: &Loan) -> Result<(), RepositoryError>;

    /// installments ordered by due date
    fn payments_for(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, RepositoryError>;
    fn fetch_payment(&self, payment_id: PaymentId) -> Result<Option<LoanPayment>, RepositoryError>;

    /// Flip a stored installment from unpaid to paid. Fails with `AlreadyPaid`
    /// when another caller got there first.
    fn mark_payment_paid(
        &self,
        payment_id: PaymentId,
        paid_on: NaiveDate,
    ) -> Result<LoanPayment, RepositoryError>;

    /// Undo `mark_payment_paid` when the money never moved.
    fn release_payment(&self, payment_id: PaymentId) -> Result<LoanPayment, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("payment {payment_id} already paid on {paid_on}")]
    AlreadyPaid {
        payment_id: PaymentId,
        paid_on: NaiveDate,
    },
    #[error("schedule already stored for loan {0}")]
    ScheduleExists(LoanId),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    /// loan -> installments in due-date order
    schedules: HashMap<LoanId, Vec<LoanPayment>>,
}

/// in-memory repository; one lock makes multi-record writes atomic
#[derive(Debug, Default)]
pub struct InMemoryLoanRepository {
    tables: Mutex<Tables>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan_count(&self) -> usize {
        self.lock().loans.len()
    }

    pub fn loans_with_status(&self, status: LoanStatus) -> Vec<Loan> {
        self.lock()
            .loans
            .values()
            .filter(|loan| loan.status == status)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Tables {
    fn payment_mut(&mut self, payment_id: PaymentId) -> Result<&mut LoanPayment, RepositoryError> {
        self.schedules
            .values_mut()
            .flatten()
            .find(|p| p.id == payment_id)
            .ok_or(RepositoryError::NotFound)
    }
}

impl LoanRepository for InMemoryLoanRepository {
    fn insert_loan(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        let mut tables = self.lock();
        if tables.loans.contains_key(&loan.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    fn transition_loan(&self, loan: &Loan, expected: LoanStatus) -> Result<bool, RepositoryError> {
        let mut tables = self.lock();
        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = loan.clone();
        Ok(true)
    }

    fn fetch_loan(&self, loan_id: LoanId) -> Result<Option<Loan>, RepositoryError> {
        Ok(self.lock().loans.get(&loan_id).cloned())
    }

    fn loans_for_account(&self, account_id: AccountId) -> Result<Vec<Loan>, RepositoryError> {
        let mut loans: Vec<Loan> = self
            .lock()
            .loans
            .values()
            .filter(|loan| loan.account_id == account_id)
            .cloned()
            .collect();
        loans.sort_by_key(|loan| loan.created_at);
        Ok(loans)
    }

    fn activate_with_schedule(
        &self,
        loan: &Loan,
        mut payments: Vec<LoanPayment>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.loans.contains_key(&loan.id) {
            return Err(RepositoryError::NotFound);
        }
        if tables.schedules.contains_key(&loan.id) {
            return Err(RepositoryError::ScheduleExists(loan.id));
        }
        if payments.iter().any(|p| p.loan_id != loan.id) {
            return Err(RepositoryError::Conflict);
        }

        payments.sort_by_key(|p| (p.due_date, p.sequence));
        tables.schedules.insert(loan.id, payments);
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    fn revert_schedule(&self, loan: &Loan) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.loans.contains_key(&loan.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.schedules.remove(&loan.id);
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    fn payments_for(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, RepositoryError> {
        Ok(self
            .lock()
            .schedules
            .get(&loan_id)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_payment(&self, payment_id: PaymentId) -> Result<Option<LoanPayment>, RepositoryError> {
        Ok(self
            .lock()
            .schedules
            .values()
            .flatten()
            .find(|p| p.id == payment_id)
            .cloned())
    }

    fn mark_payment_paid(
        &self,
        payment_id: PaymentId,
        paid_on: NaiveDate,
    ) -> Result<LoanPayment, RepositoryError> {
        let mut tables = self.lock();
        let stored = tables.payment_mut(payment_id)?;
        stored.mark_paid(paid_on).map_err(|err| match err {
            LoanError::AlreadyPaid { payment_id, paid_on } => {
                RepositoryError::AlreadyPaid { payment_id, paid_on }
            }
            other => RepositoryError::Unavailable(other.to_string()),
        })?;
        Ok(stored.clone())
    }

    fn release_payment(&self, payment_id: PaymentId) -> Result<LoanPayment, RepositoryError> {
        let mut tables = self.lock();
        let stored = tables.payment_mut(payment_id)?;
        stored.is_paid = false;
        stored.payment_date = None;
        Ok(stored.clone())
    }
}

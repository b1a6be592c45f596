use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::ledger::LedgerError;
use crate::repository::RepositoryError;
use crate::types::{AccountId, LoanId, LoanStatus, PaymentId};

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("account not found: {account_id}")]
    AccountNotFound {
        account_id: AccountId,
    },

    #[error("account closed: {account_id}")]
    AccountClosed {
        account_id: AccountId,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("payment {payment_id} not found on loan {loan_id}")]
    PaymentNotFound {
        loan_id: LoanId,
        payment_id: PaymentId,
    },

    #[error("payment {payment_id} already paid on {paid_on}")]
    AlreadyPaid {
        payment_id: PaymentId,
        paid_on: NaiveDate,
    },

    #[error("insufficient funds on account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Money,
        requested: Money,
    },

    #[error("invalid application field {field}: {message}")]
    InvalidApplication {
        field: &'static str,
        message: String,
    },

    #[error("invalid loan status transition: {from} -> {to}")]
    InvalidTransition {
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("credit score already assigned to loan {loan_id}")]
    CreditScoreAlreadySet {
        loan_id: LoanId,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<LedgerError> for LoanError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(account_id) => LoanError::AccountNotFound { account_id },
            LedgerError::InsufficientFunds {
                account_id,
                available,
                requested,
            } => LoanError::InsufficientFunds {
                account_id,
                available,
                requested,
            },
            other => LoanError::Ledger(other),
        }
    }
}

impl From<RepositoryError> for LoanError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::AlreadyPaid { payment_id, paid_on } => {
                LoanError::AlreadyPaid { payment_id, paid_on }
            }
            other => LoanError::Repository(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;

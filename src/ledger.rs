use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{AccountId, CurrencyCode};

/// account as seen by the loan engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Money,
    pub currency: CurrencyCode,
    pub is_active: bool,
}

/// Balance owner consulted by the engine. Implementations apply each
/// adjustment atomically and refuse a debit the balance cannot cover.
pub trait AccountLedger: Send + Sync {
    fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError>;
    fn adjust_balance(&self, account_id: AccountId, delta: Money) -> Result<Account, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("insufficient funds on account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Money,
        requested: Money,
    },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// in-memory ledger; one lock serializes every balance update
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, currency: CurrencyCode, opening_balance: Money) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            balance: opening_balance,
            currency,
            is_active: true,
        };
        self.lock().insert(account.id, account.clone());
        account
    }

    pub fn close_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let mut accounts = self.lock();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.is_active = false;
        Ok(account.clone())
    }

    pub fn balance(&self, account_id: AccountId) -> Option<Money> {
        self.lock().get(&account_id).map(|a| a.balance)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AccountId, Account>> {
        // a poisoned map is still structurally valid
        self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccountLedger for InMemoryLedger {
    fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        self.lock()
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    fn adjust_balance(&self, account_id: AccountId, delta: Money) -> Result<Account, LedgerError> {
        let mut accounts = self.lock();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if (account.balance + delta).is_negative() {
            return Err(LedgerError::InsufficientFunds {
                account_id,
                available: account.balance,
                requested: -delta,
            });
        }
        account.balance += delta;
        Ok(account.clone())
    }
}

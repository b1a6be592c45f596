use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::application::LoanApplication;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::events::{EventSink, LoanEvent};
use crate::ledger::{Account, AccountLedger};
use crate::loan::{Loan, LoanPayment};
use crate::payments::{installments_from_schedule, AmortizationSchedule, InstallmentProgress};
use crate::repository::LoanRepository;
use crate::types::{AccountId, LoanId, LoanStatus, PaymentId};
use crate::underwriting::{CreditScorer, RandomCreditScorer};

/// loan record together with its repayment progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan: Loan,
    pub progress: InstallmentProgress,
}

/// Loan lifecycle engine: underwriting, schedule generation, installment
/// servicing and completion detection.
pub struct LoanEngine<R, L, K, S = RandomCreditScorer> {
    config: EngineConfig,
    repository: Arc<R>,
    ledger: Arc<L>,
    sink: Arc<K>,
    scorer: S,
    rng: Mutex<StdRng>,
    /// serializes installment payments per loan
    loan_locks: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
    clock: SafeTimeProvider,
}

impl<R, L, K> LoanEngine<R, L, K, RandomCreditScorer>
where
    R: LoanRepository,
    L: AccountLedger,
    K: EventSink,
{
    /// engine with the simulated random credit bureau
    pub fn new(
        config: EngineConfig,
        repository: Arc<R>,
        ledger: Arc<L>,
        sink: Arc<K>,
        clock: SafeTimeProvider,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            repository,
            ledger,
            sink,
            scorer: RandomCreditScorer,
            rng: Mutex::new(rng),
            loan_locks: Mutex::new(HashMap::new()),
            clock,
        })
    }
}

impl<R, L, K, S> LoanEngine<R, L, K, S>
where
    R: LoanRepository,
    L: AccountLedger,
    K: EventSink,
    S: CreditScorer,
{
    /// swap the credit scoring strategy
    pub fn with_scorer<T: CreditScorer>(self, scorer: T) -> LoanEngine<R, L, K, T> {
        LoanEngine {
            config: self.config,
            repository: self.repository,
            ledger: self.ledger,
            sink: self.sink,
            scorer,
            rng: self.rng,
            loan_locks: self.loan_locks,
            clock: self.clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SafeTimeProvider {
        &self.clock
    }

    /// Score and decide an application. Approved loans come back `active`
    /// with their schedule stored and principal disbursed; rejected loans
    /// come back `rejected` with no installments.
    pub fn apply_for_loan(&self, application: LoanApplication) -> Result<Loan> {
        self.active_account(application.account_id)?;

        let now = self.clock.now();
        let mut loan = Loan::from_application(&application, now);

        let score = self.scorer.score(&application);
        loan.assign_credit_score(score)?;

        let decision = {
            let mut rng = self.lock_rng();
            self.config.underwriting.decide(score, &mut *rng)
        };

        // built before anything is stored so a bad schedule leaves no record
        let schedule = if decision.is_approved() {
            Some(AmortizationSchedule::generate(
                loan.amount,
                loan.interest_rate,
                loan.term_months,
                loan.start_date,
            )?)
        } else {
            None
        };

        let decided = if decision.is_approved() {
            LoanStatus::Approved
        } else {
            LoanStatus::Rejected
        };
        loan.transition(decided, now)?;
        let loan = self.repository.insert_loan(loan)?;

        info!(
            loan_id = %loan.id,
            account_id = %loan.account_id,
            score = score.value(),
            decision = decision.label(),
            basis = ?decision.basis,
            "loan application decided"
        );

        self.publish(LoanEvent::LoanApplied {
            account_id: loan.account_id,
            loan_id: loan.id,
            amount: loan.amount,
            currency: loan.currency.clone(),
            interest_rate: loan.interest_rate,
            term_months: loan.term_months,
            credit_score: score,
            decision: decision.label().to_string(),
        });

        match schedule {
            Some(schedule) => self.activate(loan, schedule),
            None => {
                let reason = decision.rejection_reason().unwrap_or_default().to_string();
                self.publish(LoanEvent::LoanRejected {
                    account_id: loan.account_id,
                    loan_id: loan.id,
                    amount: loan.amount,
                    currency: loan.currency.clone(),
                    credit_score: score,
                    reason,
                });
                Ok(loan)
            }
        }
    }

    /// store the schedule, flip to active, then disburse
    fn activate(&self, approved: Loan, schedule: AmortizationSchedule) -> Result<Loan> {
        let now = self.clock.now();
        let installments = installments_from_schedule(approved.id, &schedule, now);

        let mut loan = approved.clone();
        loan.transition(LoanStatus::Active, now)?;
        self.repository.activate_with_schedule(&loan, installments)?;

        debug!(
            loan_id = %loan.id,
            installments = schedule.term_months,
            installment_amount = %schedule.installment_amount(),
            total_interest = %schedule.total_interest,
            "amortization schedule stored"
        );

        if self.config.disburse_on_approval {
            if let Err(err) = self.ledger.adjust_balance(loan.account_id, loan.amount) {
                warn!(loan_id = %loan.id, error = %err, "disbursement failed, reverting schedule");
                if let Err(revert) = self.repository.revert_schedule(&approved) {
                    error!(loan_id = %loan.id, error = %revert, "schedule revert failed");
                }
                return Err(err.into());
            }
            info!(
                loan_id = %loan.id,
                account_id = %loan.account_id,
                amount = %loan.amount,
                "loan principal disbursed"
            );
        }

        self.publish(LoanEvent::LoanApproved {
            account_id: loan.account_id,
            loan_id: loan.id,
            amount: loan.amount,
            currency: loan.currency.clone(),
            installment_amount: schedule.installment_amount(),
            first_due_date: schedule.first_due_date().unwrap_or(loan.start_date),
            maturity_date: schedule.maturity_date().unwrap_or(loan.start_date),
        });

        Ok(loan)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.repository.fetch_loan(loan_id)?)
    }

    pub fn list_loans_by_account(&self, account_id: AccountId) -> Result<Vec<Loan>> {
        Ok(self.repository.loans_for_account(account_id)?)
    }

    /// installments ordered by due date; empty for unknown or rejected loans
    pub fn get_payments(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>> {
        Ok(self.repository.payments_for(loan_id)?)
    }

    /// Pay one installment from the loan's linked account. Payments on one
    /// loan run one at a time, and the installment is claimed in the
    /// repository before the debit, so a second payer sees `AlreadyPaid`
    /// and exactly one debit happens.
    pub fn pay_installment(
        &self,
        loan_id: LoanId,
        payment_id: PaymentId,
        payment_date: NaiveDate,
    ) -> Result<LoanPayment> {
        let lock = self.loan_lock(loan_id);
        let _serialized = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let loan = self.require_loan(loan_id)?;
        let payment = self.require_payment(&loan, payment_id)?;
        payment.ensure_unpaid()?;

        let account = self.ledger.get_account(loan.account_id)?;
        if account.balance < payment.amount {
            warn!(
                loan_id = %loan.id,
                payment_id = %payment.id,
                available = %account.balance,
                requested = %payment.amount,
                "installment payment refused"
            );
            return Err(LoanError::InsufficientFunds {
                account_id: account.id,
                available: account.balance,
                requested: payment.amount,
            });
        }

        let paid = self.repository.mark_payment_paid(payment.id, payment_date)?;

        if let Err(err) = self.ledger.adjust_balance(loan.account_id, -paid.amount) {
            warn!(payment_id = %paid.id, error = %err, "installment debit failed, releasing claim");
            if let Err(release) = self.repository.release_payment(paid.id) {
                error!(payment_id = %paid.id, error = %release, "installment claim release failed");
            }
            return Err(err.into());
        }

        info!(
            loan_id = %loan.id,
            payment_id = %paid.id,
            sequence = paid.sequence,
            amount = %paid.amount,
            "installment paid"
        );

        self.publish(LoanEvent::LoanPaymentMade {
            account_id: loan.account_id,
            loan_id: loan.id,
            payment_id: paid.id,
            amount: paid.amount,
            currency: loan.currency.clone(),
            payment_date,
        });

        self.complete_if_settled(loan)?;

        Ok(paid)
    }

    /// Record a missed installment. Only an event is raised: the installment
    /// stays unpaid and may later be paid or reported missed again.
    pub fn mark_installment_as_missed(
        &self,
        loan_id: LoanId,
        payment_id: PaymentId,
    ) -> Result<LoanPayment> {
        let loan = self.require_loan(loan_id)?;
        let payment = self.require_payment(&loan, payment_id)?;
        payment.ensure_unpaid()?;

        info!(
            loan_id = %loan.id,
            payment_id = %payment.id,
            due_date = %payment.due_date,
            "installment marked missed"
        );

        self.publish(LoanEvent::LoanPaymentMissed {
            account_id: loan.account_id,
            loan_id: loan.id,
            payment_id: payment.id,
            amount: payment.amount,
            currency: loan.currency.clone(),
            due_date: payment.due_date,
        });

        Ok(payment)
    }

    pub fn loan_summary(&self, loan_id: LoanId) -> Result<LoanSummary> {
        let loan = self.require_loan(loan_id)?;
        let installments = self.repository.payments_for(loan.id)?;
        Ok(LoanSummary {
            loan,
            progress: InstallmentProgress::from_installments(&installments),
        })
    }

    /// full principal/interest split for a stored loan
    pub fn amortization_for(&self, loan_id: LoanId) -> Result<AmortizationSchedule> {
        let loan = self.require_loan(loan_id)?;
        AmortizationSchedule::generate(loan.amount, loan.interest_rate, loan.term_months, loan.start_date)
    }

    /// schedule for hypothetical terms; nothing is stored
    pub fn schedule_preview(
        &self,
        amount: Money,
        interest_rate: Rate,
        term_months: u32,
        start_date: NaiveDate,
    ) -> Result<AmortizationSchedule> {
        AmortizationSchedule::generate(amount, interest_rate, term_months, start_date)
    }

    fn complete_if_settled(&self, mut loan: Loan) -> Result<()> {
        let installments = self.repository.payments_for(loan.id)?;
        let progress = InstallmentProgress::from_installments(&installments);
        if !progress.is_fully_paid() || loan.status != LoanStatus::Active {
            return Ok(());
        }

        loan.transition(LoanStatus::Completed, self.clock.now())?;
        // another engine over the same repository may have completed it first
        if !self.repository.transition_loan(&loan, LoanStatus::Active)? {
            return Ok(());
        }

        info!(loan_id = %loan.id, amount_paid = %progress.amount_paid, "loan completed");
        // every installment is paid, so late arrivals fail on the claim anyway
        self.lock_loan_locks().remove(&loan.id);

        self.publish(LoanEvent::LoanCompleted {
            account_id: loan.account_id,
            loan_id: loan.id,
        });
        Ok(())
    }

    fn active_account(&self, account_id: AccountId) -> Result<Account> {
        let account = self.ledger.get_account(account_id)?;
        if !account.is_active {
            return Err(LoanError::AccountClosed { account_id });
        }
        Ok(account)
    }

    fn require_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.repository
            .fetch_loan(loan_id)?
            .ok_or(LoanError::LoanNotFound { loan_id })
    }

    fn require_payment(&self, loan: &Loan, payment_id: PaymentId) -> Result<LoanPayment> {
        match self.repository.fetch_payment(payment_id)? {
            Some(payment) if payment.loan_id == loan.id => Ok(payment),
            _ => Err(LoanError::PaymentNotFound {
                loan_id: loan.id,
                payment_id,
            }),
        }
    }

    /// best effort: sink failures are logged, never surfaced
    fn publish(&self, event: LoanEvent) {
        let event_type = event.event_type();
        let loan_id = event.loan_id();
        let delivered = event
            .into_envelope(self.clock.now())
            .and_then(|envelope| self.sink.emit(envelope));

        if let Err(err) = delivered {
            warn!(event_type, loan_id = %loan_id, error = %err, "event delivery failed");
        }
    }

    fn loan_lock(&self, loan_id: LoanId) -> Arc<Mutex<()>> {
        self.lock_loan_locks().entry(loan_id).or_default().clone()
    }

    fn lock_loan_locks(&self) -> MutexGuard<'_, HashMap<LoanId, Arc<Mutex<()>>>> {
        self.loan_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventEnvelope, EventStore, SinkError};
    use crate::ledger::{InMemoryLedger, LedgerError};
    use crate::repository::{InMemoryLoanRepository, RepositoryError};
    use crate::types::CurrencyCode;
    use crate::underwriting::FixedCreditScorer;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    fn clock() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        ))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn application(account_id: AccountId, amount: i64, term_months: u32) -> LoanApplication {
        LoanApplication {
            account_id,
            amount: Money::from_major(amount),
            currency: CurrencyCode::usd(),
            interest_rate: Rate::from_percentage(6),
            term_months,
            start_date: date(2024, 1, 1),
        }
    }

    struct Harness<S> {
        engine: LoanEngine<InMemoryLoanRepository, InMemoryLedger, EventStore, S>,
        repository: Arc<InMemoryLoanRepository>,
        ledger: Arc<InMemoryLedger>,
        events: Arc<EventStore>,
    }

    fn harness(score: u16) -> Harness<FixedCreditScorer> {
        let repository = Arc::new(InMemoryLoanRepository::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let events = Arc::new(EventStore::new());
        let engine = LoanEngine::new(
            EngineConfig::standard().with_seed(11),
            repository.clone(),
            ledger.clone(),
            events.clone(),
            clock(),
        )
        .unwrap()
        .with_scorer(FixedCreditScorer::new(score));

        Harness {
            engine,
            repository,
            ledger,
            events,
        }
    }

    #[test]
    fn test_unknown_account_is_rejected_before_anything_is_stored() {
        let h = harness(800);
        let missing = Uuid::new_v4();

        let err = h.engine.apply_for_loan(application(missing, 1_000, 6)).unwrap_err();
        assert!(matches!(err, LoanError::AccountNotFound { account_id } if account_id == missing));
        assert_eq!(h.repository.loan_count(), 0);
        assert!(h.events.events().is_empty());
    }

    #[test]
    fn test_closed_account_is_rejected() {
        let h = harness(800);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::ZERO);
        h.ledger.close_account(account.id).unwrap();

        let err = h.engine.apply_for_loan(application(account.id, 1_000, 6)).unwrap_err();
        assert!(matches!(err, LoanError::AccountClosed { .. }));
        assert_eq!(h.repository.loan_count(), 0);
    }

    #[test]
    fn test_approved_loan_is_active_and_disbursed() {
        let h = harness(760);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::from_major(50));

        let loan = h.engine.apply_for_loan(application(account.id, 3_000, 3)).unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.credit_score.map(|s| s.value()), Some(760));
        assert_eq!(h.engine.get_payments(loan.id).unwrap().len(), 3);
        assert_eq!(h.ledger.balance(account.id), Some(Money::from_major(3_050)));

        let types: Vec<String> = h.events.events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["loan-applied", "loan-approved"]);
    }

    #[test]
    fn test_disbursement_can_be_disabled() {
        let repository = Arc::new(InMemoryLoanRepository::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let mut config = EngineConfig::standard();
        config.disburse_on_approval = false;
        let engine = LoanEngine::new(config, repository, ledger.clone(), Arc::new(EventStore::new()), clock())
            .unwrap()
            .with_scorer(FixedCreditScorer::new(820));
        let account = ledger.open_account(CurrencyCode::usd(), Money::ZERO);

        let loan = engine.apply_for_loan(application(account.id, 3_000, 3)).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(ledger.balance(account.id), Some(Money::ZERO));
    }

    #[test]
    fn test_rejected_loan_carries_reason() {
        let h = harness(550);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::from_major(50));

        let loan = h.engine.apply_for_loan(application(account.id, 3_000, 3)).unwrap();

        assert_eq!(loan.status, LoanStatus::Rejected);
        assert!(h.engine.get_payments(loan.id).unwrap().is_empty());
        assert_eq!(h.ledger.balance(account.id), Some(Money::from_major(50)));

        let rejected: Vec<EventEnvelope> = h
            .events
            .events()
            .into_iter()
            .filter(|e| e.event_type == "loan-rejected")
            .collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].payload_str("reason"), Some("low credit score"));
        assert_eq!(rejected[0].payload["credit_score"], 550);
    }

    #[test]
    fn test_payment_from_other_loan_is_not_found() {
        let h = harness(780);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::from_major(10_000));
        let first = h.engine.apply_for_loan(application(account.id, 1_000, 2)).unwrap();
        let second = h.engine.apply_for_loan(application(account.id, 1_000, 2)).unwrap();
        let foreign = h.engine.get_payments(second.id).unwrap()[0].id;

        let err = h
            .engine
            .pay_installment(first.id, foreign, date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            LoanError::PaymentNotFound { loan_id, payment_id } if loan_id == first.id && payment_id == foreign
        ));
    }

    #[test]
    fn test_unknown_loan_is_not_found() {
        let h = harness(780);
        let loan_id = Uuid::new_v4();
        assert!(matches!(
            h.engine.pay_installment(loan_id, Uuid::new_v4(), date(2024, 2, 1)),
            Err(LoanError::LoanNotFound { .. })
        ));
        assert!(matches!(
            h.engine.mark_installment_as_missed(loan_id, Uuid::new_v4()),
            Err(LoanError::LoanNotFound { .. })
        ));
        assert!(h.engine.get_loan(loan_id).unwrap().is_none());
    }

    #[test]
    fn test_missed_installment_changes_nothing() {
        let h = harness(780);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::from_major(0));
        let loan = h.engine.apply_for_loan(application(account.id, 1_000, 2)).unwrap();
        let installment = h.engine.get_payments(loan.id).unwrap()[0].clone();
        let balance = h.ledger.balance(account.id);

        let first = h.engine.mark_installment_as_missed(loan.id, installment.id).unwrap();
        let second = h.engine.mark_installment_as_missed(loan.id, installment.id).unwrap();

        assert_eq!(first, installment);
        assert_eq!(second, installment);
        assert_eq!(h.ledger.balance(account.id), balance);
        assert_eq!(h.events.count_of("loan-payment-missed"), 2);
        assert_eq!(h.engine.get_loan(loan.id).unwrap().unwrap().status, LoanStatus::Active);

        // still payable afterwards
        h.engine.pay_installment(loan.id, installment.id, date(2024, 2, 5)).unwrap();
        assert!(matches!(
            h.engine.mark_installment_as_missed(loan.id, installment.id),
            Err(LoanError::AlreadyPaid { .. })
        ));
    }

    #[test]
    fn test_summary_reports_progress() {
        let h = harness(780);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::ZERO);
        let loan = h.engine.apply_for_loan(application(account.id, 3_000, 3)).unwrap();
        let first = h.engine.get_payments(loan.id).unwrap()[0].id;
        h.engine.pay_installment(loan.id, first, date(2024, 2, 1)).unwrap();

        let summary = h.engine.loan_summary(loan.id).unwrap();
        assert_eq!(summary.progress.installments_paid, 1);
        assert_eq!(summary.progress.installments_remaining, 2);
        assert_eq!(summary.progress.next_due, Some(date(2024, 3, 1)));
        assert_eq!(summary.loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_amortization_for_stored_loan() {
        let h = harness(780);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::ZERO);
        let loan = h.engine.apply_for_loan(application(account.id, 12_000, 12)).unwrap();

        let schedule = h.engine.amortization_for(loan.id).unwrap();
        let stored = h.engine.get_payments(loan.id).unwrap();
        assert_eq!(schedule.installment_amount(), stored[0].amount);
        assert_eq!(
            schedule.payments.iter().map(|p| p.due_date).collect::<Vec<_>>(),
            stored.iter().map(|p| p.due_date).collect::<Vec<_>>()
        );
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _envelope: EventEnvelope) -> std::result::Result<(), SinkError> {
            Err(SinkError::Unavailable("event endpoint down".to_string()))
        }
    }

    #[test]
    fn test_sink_failure_does_not_roll_back() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = LoanEngine::new(
            EngineConfig::standard(),
            Arc::new(InMemoryLoanRepository::new()),
            ledger.clone(),
            Arc::new(FailingSink),
            clock(),
        )
        .unwrap()
        .with_scorer(FixedCreditScorer::new(790));
        let account = ledger.open_account(CurrencyCode::usd(), Money::ZERO);

        let loan = engine.apply_for_loan(application(account.id, 1_000, 1)).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);

        let installment = engine.get_payments(loan.id).unwrap()[0].clone();
        engine.pay_installment(loan.id, installment.id, date(2024, 2, 1)).unwrap();
        assert_eq!(engine.get_loan(loan.id).unwrap().unwrap().status, LoanStatus::Completed);
    }

    /// ledger that refuses credits
    struct CreditRefusingLedger(InMemoryLedger);

    impl AccountLedger for CreditRefusingLedger {
        fn get_account(&self, account_id: AccountId) -> std::result::Result<Account, LedgerError> {
            self.0.get_account(account_id)
        }

        fn adjust_balance(
            &self,
            account_id: AccountId,
            delta: Money,
        ) -> std::result::Result<Account, LedgerError> {
            if delta.is_positive() {
                return Err(LedgerError::Unavailable("core banking offline".to_string()));
            }
            self.0.adjust_balance(account_id, delta)
        }
    }

    #[test]
    fn test_failed_disbursement_reverts_schedule() {
        let ledger = Arc::new(CreditRefusingLedger(InMemoryLedger::new()));
        let repository = Arc::new(InMemoryLoanRepository::new());
        let engine = LoanEngine::new(
            EngineConfig::standard(),
            repository.clone(),
            ledger.clone(),
            Arc::new(EventStore::new()),
            clock(),
        )
        .unwrap()
        .with_scorer(FixedCreditScorer::new(790));
        let account = ledger.0.open_account(CurrencyCode::usd(), Money::ZERO);

        let err = engine.apply_for_loan(application(account.id, 1_000, 4)).unwrap_err();
        assert!(matches!(err, LoanError::Ledger(LedgerError::Unavailable(_))));

        let stored = repository.loans_for_account(account.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, LoanStatus::Approved);
        assert!(repository.payments_for(stored[0].id).unwrap().is_empty());
    }

    /// repository whose installment writes fail
    struct ReadOnlyPayments(InMemoryLoanRepository);

    impl LoanRepository for ReadOnlyPayments {
        fn insert_loan(&self, loan: Loan) -> std::result::Result<Loan, RepositoryError> {
            self.0.insert_loan(loan)
        }
        fn transition_loan(
            &self,
            loan: &Loan,
            expected: LoanStatus,
        ) -> std::result::Result<bool, RepositoryError> {
            self.0.transition_loan(loan, expected)
        }
        fn fetch_loan(&self, loan_id: LoanId) -> std::result::Result<Option<Loan>, RepositoryError> {
            self.0.fetch_loan(loan_id)
        }
        fn loans_for_account(&self, account_id: AccountId) -> std::result::Result<Vec<Loan>, RepositoryError> {
            self.0.loans_for_account(account_id)
        }
        fn activate_with_schedule(
            &self,
            loan: &Loan,
            payments: Vec<LoanPayment>,
        ) -> std::result::Result<(), RepositoryError> {
            self.0.activate_with_schedule(loan, payments)
        }
        fn revert_schedule(&self, loan: &Loan) -> std::result::Result<(), RepositoryError> {
            self.0.revert_schedule(loan)
        }
        fn payments_for(&self, loan_id: LoanId) -> std::result::Result<Vec<LoanPayment>, RepositoryError> {
            self.0.payments_for(loan_id)
        }
        fn fetch_payment(&self, payment_id: PaymentId) -> std::result::Result<Option<LoanPayment>, RepositoryError> {
            self.0.fetch_payment(payment_id)
        }
        fn mark_payment_paid(
            &self,
            _payment_id: PaymentId,
            _paid_on: NaiveDate,
        ) -> std::result::Result<LoanPayment, RepositoryError> {
            Err(RepositoryError::Unavailable("disk full".to_string()))
        }
        fn release_payment(&self, payment_id: PaymentId) -> std::result::Result<LoanPayment, RepositoryError> {
            self.0.release_payment(payment_id)
        }
    }

    #[test]
    fn test_failed_payment_write_leaves_balance_untouched() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = LoanEngine::new(
            EngineConfig::standard(),
            Arc::new(ReadOnlyPayments(InMemoryLoanRepository::new())),
            ledger.clone(),
            Arc::new(EventStore::new()),
            clock(),
        )
        .unwrap()
        .with_scorer(FixedCreditScorer::new(790));
        let account = ledger.open_account(CurrencyCode::usd(), Money::ZERO);
        let loan = engine.apply_for_loan(application(account.id, 1_000, 2)).unwrap();
        let balance = ledger.balance(account.id);
        let installment = engine.get_payments(loan.id).unwrap()[0].clone();

        let err = engine
            .pay_installment(loan.id, installment.id, date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(err, LoanError::Repository(RepositoryError::Unavailable(_))));
        assert_eq!(ledger.balance(account.id), balance);
        assert!(!engine.get_payments(loan.id).unwrap()[0].is_paid);
    }

    /// ledger that refuses debits
    struct DebitRefusingLedger(InMemoryLedger);

    impl AccountLedger for DebitRefusingLedger {
        fn get_account(&self, account_id: AccountId) -> std::result::Result<Account, LedgerError> {
            self.0.get_account(account_id)
        }

        fn adjust_balance(
            &self,
            account_id: AccountId,
            delta: Money,
        ) -> std::result::Result<Account, LedgerError> {
            if delta.is_negative() {
                return Err(LedgerError::Unavailable("core banking offline".to_string()));
            }
            self.0.adjust_balance(account_id, delta)
        }
    }

    #[test]
    fn test_failed_debit_releases_installment() {
        let ledger = Arc::new(DebitRefusingLedger(InMemoryLedger::new()));
        let events = Arc::new(EventStore::new());
        let engine = LoanEngine::new(
            EngineConfig::standard(),
            Arc::new(InMemoryLoanRepository::new()),
            ledger.clone(),
            events.clone(),
            clock(),
        )
        .unwrap()
        .with_scorer(FixedCreditScorer::new(790));
        let account = ledger.0.open_account(CurrencyCode::usd(), Money::from_major(100));
        let loan = engine.apply_for_loan(application(account.id, 1_000, 1)).unwrap();
        let installment = engine.get_payments(loan.id).unwrap()[0].clone();

        let err = engine
            .pay_installment(loan.id, installment.id, date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(err, LoanError::Ledger(LedgerError::Unavailable(_))));

        let stored = engine.get_payments(loan.id).unwrap()[0].clone();
        assert_eq!(stored, installment);
        assert_eq!(engine.get_loan(loan.id).unwrap().unwrap().status, LoanStatus::Active);
        assert_eq!(events.count_of("loan-payment-made"), 0);
    }

    #[test]
    fn test_term_beyond_decimal_range_stores_nothing() {
        let h = harness(800);
        let account = h.ledger.open_account(CurrencyCode::usd(), Money::ZERO);
        let mut app = application(account.id, 10_000, 3_000);
        app.interest_rate = Rate::from_percentage(30);

        let err = h.engine.apply_for_loan(app).unwrap_err();
        assert!(matches!(err, LoanError::InvalidApplication { field: "term_months", .. }));
        assert_eq!(h.repository.loan_count(), 0);
        assert!(h.events.events().is_empty());
        assert_eq!(h.ledger.balance(account.id), Some(Money::ZERO));
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = EngineConfig::standard();
        config.underwriting.review_approval_probability = -0.1;
        let result = LoanEngine::new(
            config,
            Arc::new(InMemoryLoanRepository::new()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(EventStore::new()),
            clock(),
        );
        assert!(matches!(result, Err(LoanError::InvalidConfiguration { .. })));
    }
}

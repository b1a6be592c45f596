pub mod application;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod repository;
pub mod types;
pub mod underwriting;

// re-export key types
pub use application::LoanApplication;
pub use config::{ApplicationLimits, EngineConfig};
pub use decimal::{Money, Rate};
pub use engine::{LoanEngine, LoanSummary};
pub use errors::{LoanError, Result};
pub use events::{EventEnvelope, EventSink, EventStore, LoanEvent, SinkError};
pub use ledger::{Account, AccountLedger, InMemoryLedger, LedgerError};
pub use loan::{Loan, LoanPayment};
pub use payments::{AmortizationSchedule, InstallmentProgress, ScheduledPayment};
pub use repository::{InMemoryLoanRepository, LoanRepository, RepositoryError};
pub use types::{AccountId, CurrencyCode, LoanId, LoanStatus, PaymentId};
pub use underwriting::{
    CreditScore, CreditScorer, DecisionBasis, FixedCreditScorer, RandomCreditScorer,
    UnderwritingDecision, UnderwritingOutcome, UnderwritingPolicy,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{AccountId, CurrencyCode, LoanId, PaymentId};
use crate::underwriting::CreditScore;

/// unique identifier for an emitted event
pub type EventId = Uuid;

/// domain events emitted by the loan engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LoanEvent {
    LoanApplied {
        account_id: AccountId,
        loan_id: LoanId,
        amount: Money,
        currency: CurrencyCode,
        interest_rate: Rate,
        term_months: u32,
        credit_score: CreditScore,
        decision: String,
    },
    LoanApproved {
        account_id: AccountId,
        loan_id: LoanId,
        amount: Money,
        currency: CurrencyCode,
        installment_amount: Money,
        first_due_date: NaiveDate,
        maturity_date: NaiveDate,
    },
    LoanRejected {
        account_id: AccountId,
        loan_id: LoanId,
        amount: Money,
        currency: CurrencyCode,
        credit_score: CreditScore,
        reason: String,
    },
    LoanPaymentMade {
        account_id: AccountId,
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        currency: CurrencyCode,
        payment_date: NaiveDate,
    },
    LoanPaymentMissed {
        account_id: AccountId,
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        currency: CurrencyCode,
        due_date: NaiveDate,
    },
    LoanCompleted {
        account_id: AccountId,
        loan_id: LoanId,
    },
}

impl LoanEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::LoanApplied { .. } => "loan-applied",
            LoanEvent::LoanApproved { .. } => "loan-approved",
            LoanEvent::LoanRejected { .. } => "loan-rejected",
            LoanEvent::LoanPaymentMade { .. } => "loan-payment-made",
            LoanEvent::LoanPaymentMissed { .. } => "loan-payment-missed",
            LoanEvent::LoanCompleted { .. } => "loan-completed",
        }
    }

    pub fn loan_id(&self) -> LoanId {
        match self {
            LoanEvent::LoanApplied { loan_id, .. }
            | LoanEvent::LoanApproved { loan_id, .. }
            | LoanEvent::LoanRejected { loan_id, .. }
            | LoanEvent::LoanPaymentMade { loan_id, .. }
            | LoanEvent::LoanPaymentMissed { loan_id, .. }
            | LoanEvent::LoanCompleted { loan_id, .. } => *loan_id,
        }
    }

    /// flat key-value payload without the type tag
    pub fn payload(&self) -> Result<Map<String, Value>, SinkError> {
        match serde_json::to_value(self).map_err(|e| SinkError::Encoding(e.to_string()))? {
            Value::Object(mut map) => {
                map.remove("type");
                Ok(map)
            }
            other => Err(SinkError::Encoding(format!(
                "expected an object payload, got {other}"
            ))),
        }
    }

    pub fn into_envelope(self, occurred_at: DateTime<Utc>) -> Result<EventEnvelope, SinkError> {
        Ok(EventEnvelope {
            id: Uuid::new_v4(),
            event_type: self.event_type().to_string(),
            occurred_at,
            payload: self.payload()?,
        })
    }
}

/// transport form handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Outbound event consumer. Delivery is fire-and-forget from the engine's side:
/// an error is logged and never undoes the operation that raised the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("event encoding failed: {0}")]
    Encoding(String),
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// event store collecting envelopes in memory
#[derive(Debug, Default)]
pub struct EventStore {
    events: Mutex<Vec<EventEnvelope>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.lock().clone()
    }

    pub fn take_events(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.lock())
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EventEnvelope>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for EventStore {
    fn emit(&self, envelope: EventEnvelope) -> Result<(), SinkError> {
        self.lock().push(envelope);
        Ok(())
    }
}

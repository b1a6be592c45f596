/// lifecycle - application, schedule, servicing and completion of a loan
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use loan_engine_rs::{
    CurrencyCode, EngineConfig, EventStore, FixedCreditScorer, InMemoryLedger,
    InMemoryLoanRepository, LoanApplication, LoanEngine, Money, Rate, SafeTimeProvider,
    TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loan_engine_rs=info")),
        )
        .compact()
        .init();

    println!("=== loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let ledger = Arc::new(InMemoryLedger::new());
    let events = Arc::new(EventStore::new());
    let engine = LoanEngine::new(
        EngineConfig::standard(),
        Arc::new(InMemoryLoanRepository::new()),
        ledger.clone(),
        events.clone(),
        time,
    )?
    .with_scorer(FixedCreditScorer::new(750));

    let account = ledger.open_account(CurrencyCode::usd(), Money::from_major(1_000));
    println!("account opened with ${}", account.balance);

    // 1. application
    println!("\n1. application");
    println!("--------------");
    let application = LoanApplication {
        account_id: account.id,
        amount: Money::from_major(12_000),
        currency: CurrencyCode::usd(),
        interest_rate: Rate::from_percentage(6),
        term_months: 12,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    };
    application.validate(&engine.config().limits)?;

    let loan = engine.apply_for_loan(application)?;
    println!("  status: {}", loan.status);
    println!("  credit score: {:?}", loan.credit_score.map(|s| s.value()));
    println!("  balance after disbursement: ${}", ledger.balance(account.id).unwrap_or_default());

    // 2. schedule
    println!("\n2. schedule");
    println!("-----------");
    let schedule = engine.amortization_for(loan.id)?;
    for row in &schedule.payments {
        println!(
            "  #{:>2} {}  payment ${:.2}  principal ${:.2}  interest ${:.2}  balance ${:.2}",
            row.payment_number,
            row.due_date,
            row.payment_amount.as_decimal(),
            row.principal_portion.as_decimal(),
            row.interest_portion.as_decimal(),
            row.ending_balance.as_decimal(),
        );
    }
    println!("  total interest: ${:.2}", schedule.total_interest.as_decimal());

    // 3. servicing
    println!("\n3. servicing");
    println!("------------");
    let installments = engine.get_payments(loan.id)?;
    engine.mark_installment_as_missed(loan.id, installments[0].id)?;
    println!("  installment 1 reported missed");

    for installment in &installments {
        engine.pay_installment(loan.id, installment.id, installment.due_date)?;
    }
    let summary = engine.loan_summary(loan.id)?;
    println!("  installments paid: {}", summary.progress.installments_paid);
    println!("  amount paid: ${}", summary.progress.amount_paid);

    // 4. completion
    println!("\n4. completion");
    println!("-------------");
    println!("  status: {}", summary.loan.status);
    println!("  final balance: ${}", ledger.balance(account.id).unwrap_or_default());

    println!("\nevents emitted:");
    for event in events.events() {
        println!("  {} {}", event.occurred_at.format("%Y-%m-%d"), event.event_type);
    }

    Ok(())
}

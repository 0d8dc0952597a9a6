use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use colored::Colorize;

use rentbook::error::Result;
use rentbook::intake::CsvExtractor;
use rentbook::models::{month_end, month_start, BankAccount, Payment, PaymentStatus, Tenant};
use rentbook::service::{Pipeline, PipelineConfig};
use rentbook::settings::Settings;
use rentbook::store::MemoryStore;

use super::{classify, late, remind, report, review, tenants, Session};

const OPENING_BALANCE: f64 = 5000.0;

struct DemoTenant {
    first_name: &'static str,
    last_name: &'static str,
    rent: f64,
}

const TENANTS: &[DemoTenant] = &[
    DemoTenant { first_name: "Mara", last_name: "Quinn", rent: 1450.0 },
    DemoTenant { first_name: "Theo", last_name: "Brandt", rent: 1200.0 },
    DemoTenant { first_name: "Ana", last_name: "Ruiz", rent: 1200.0 },
    DemoTenant { first_name: "Sam", last_name: "Okafor", rent: 975.0 },
];

struct DemoTxn {
    day: u32,
    description: &'static str,
    amount: f64,
}

/// This month's statement: one clean rent match, one amount two tenants
/// share, a few bills the category names catch, and one nobody can place.
const STATEMENT: &[DemoTxn] = &[
    DemoTxn { day: 2, description: "ACH DEPOSIT M QUINN", amount: 1450.0 },
    DemoTxn { day: 3, description: "MOBILE DEPOSIT", amount: 1200.0 },
    DemoTxn { day: 5, description: "FIRST NATIONAL MORTGAGE PMT", amount: -2100.0 },
    DemoTxn { day: 6, description: "CITY WATER UTILITIES", amount: -86.40 },
    DemoTxn { day: 9, description: "STATE FARM INSURANCE", amount: -118.00 },
    DemoTxn { day: 12, description: "ACE HARDWARE #221", amount: -42.15 },
];

fn make_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| month_end(first))
}

fn statement_csv(today: NaiveDate) -> String {
    let mut csv = String::from("Date,Description,Amount,Balance\n");
    let mut balance = OPENING_BALANCE;
    for t in STATEMENT {
        balance += t.amount;
        let date = make_date(today.year(), today.month(), t.day);
        csv.push_str(&format!("{date},{},{:.2},{balance:.2}\n", t.description, t.amount));
    }
    csv
}

fn seed(session: &Session) -> Result<BankAccount> {
    let store = session.pipeline.store();
    let today = session.pipeline.today();
    let this_month = month_start(today);
    let last_month = this_month - Months::new(1);

    let account = store.insert_account(BankAccount {
        id: 0,
        user_id: session.user_id,
        name: "Operating Checking".to_string(),
        balance: OPENING_BALANCE,
        currency: session.currency.clone(),
        is_default: true,
    })?;

    for (i, t) in TENANTS.iter().enumerate() {
        let tenant = store.insert_tenant(Tenant {
            id: 0,
            user_id: session.user_id,
            property_id: None,
            first_name: t.first_name.to_string(),
            last_name: t.last_name.to_string(),
            email: Some(format!("{}@example.com", t.first_name.to_lowercase())),
            phone: None,
            lease_start: None,
            lease_end: None,
            rent_amount: t.rent,
            rent_due_day: 1,
            active: true,
        })?;
        let expected = |due_date: NaiveDate| Payment {
            id: 0,
            user_id: session.user_id,
            tenant_id: tenant.id,
            property_id: None,
            amount: t.rent,
            due_date,
            date_paid: None,
            status: PaymentStatus::Pending,
            transaction_id: None,
            notes: Some("Expected rent".to_string()),
        };
        let mut paid = expected(last_month);
        paid.mark_received(last_month, None);
        store.insert_payment(paid)?;
        // The last tenant has nothing on the books for this month yet.
        if i + 1 < TENANTS.len() {
            store.insert_payment(expected(this_month))?;
        }
    }
    Ok(account)
}

fn step(title: &str) {
    println!("\n{}", title.cyan().bold());
}

pub fn run(settings: &Settings, today: Option<NaiveDate>) -> Result<()> {
    let mut pipeline = Pipeline::new(Arc::new(MemoryStore::new()), PipelineConfig::from(settings));
    if let Some(today) = today {
        pipeline = pipeline.with_today(today);
    }
    let session = Session {
        pipeline,
        user_id: settings.user_id,
        currency: settings.currency.clone(),
    };
    let today = session.pipeline.today();
    println!(
        "Demo books for {} (in memory, nothing is saved)",
        today.format("%B %Y")
    );

    let account = seed(&session)?;
    tenants::list(&session)?;

    step("1. Statement intake");
    let csv = statement_csv(today);
    let outcome = session.pipeline.ingest_document(
        account.id,
        "demo-statement.csv",
        csv.as_bytes(),
        "csv",
        &CsvExtractor,
    )?;
    println!(
        "Statement {}: {} transactions, balances {}",
        outcome.statement.id,
        outcome.transactions.len(),
        if outcome.statement.balance_verified {
            "verified".green()
        } else {
            "off".red()
        }
    );

    step("2. Classification");
    classify::run(&session, Some(outcome.statement.id))?;
    review::list(&session)?;

    step("3. Ledger");
    report::summary(&session, None, None, None, None)?;

    step("4. Late payments");
    late::run(&session, true)?;

    step("5. Reminders");
    remind::schedule(&session)?;
    remind::deliver(&session)?;
    remind::list(&session)?;

    Ok(())
}

use std::collections::HashMap;

use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::{RentbookError, Result};
use rentbook::fmt::money;
use rentbook::models::{Id, Payment, PaymentStatus};
use rentbook::store::require;

use super::{parse_date_arg, Session};

pub fn add(
    session: &Session,
    tenant_id: Id,
    due: &str,
    amount: Option<f64>,
    status: PaymentStatus,
) -> Result<()> {
    let store = session.pipeline.store();
    let tenant = require(store.tenant(tenant_id)?, "tenant", tenant_id)?;
    let due_date = parse_date_arg(due)?;
    let amount = amount.unwrap_or(tenant.rent_amount);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(RentbookError::Validation(format!("amount must be positive, got {amount}")));
    }

    let mut payment = Payment {
        id: 0,
        user_id: tenant.user_id,
        tenant_id,
        property_id: tenant.property_id,
        amount,
        due_date,
        date_paid: None,
        status,
        transaction_id: None,
        notes: None,
    };
    if status == PaymentStatus::Received {
        payment.mark_received(session.pipeline.today(), None);
    }
    let payment = store.insert_payment(payment)?;
    println!(
        "Added payment {} for {}: {} due {}",
        payment.id,
        tenant.full_name(),
        money(payment.amount),
        payment.due_date
    );
    Ok(())
}

pub(crate) fn status_label(status: PaymentStatus) -> colored::ColoredString {
    match status {
        PaymentStatus::Received => status.as_str().green(),
        PaymentStatus::Late | PaymentStatus::Overdue => status.as_str().red(),
        PaymentStatus::PartiallyPaid => status.as_str().yellow(),
        _ => status.as_str().normal(),
    }
}

pub fn list(session: &Session, tenant: Option<Id>) -> Result<()> {
    let store = session.pipeline.store();
    let names: HashMap<Id, String> = store
        .tenants_for_user(session.user_id)?
        .into_iter()
        .map(|t| (t.id, t.full_name()))
        .collect();
    let mut payments = match tenant {
        Some(id) => store.payments_for_tenant(id)?,
        None => store.payments_for_user(session.user_id)?,
    };
    payments.sort_by(|a, b| b.due_date.cmp(&a.due_date).then(b.id.cmp(&a.id)));

    let mut table = Table::new();
    table.set_header(vec!["ID", "Tenant", "Due", "Amount", "Status", "Paid", "Txn"]);
    for p in payments {
        table.add_row(vec![
            Cell::new(p.id),
            Cell::new(names.get(&p.tenant_id).cloned().unwrap_or_default()),
            Cell::new(p.due_date),
            Cell::new(money(p.amount)),
            Cell::new(status_label(p.status)),
            Cell::new(p.date_paid.map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(p.transaction_id.map(|id| id.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Payments\n{table}");
    Ok(())
}

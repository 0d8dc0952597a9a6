use comfy_table::{Cell, Table};

use rentbook::classifier::ensure_default_categories;
use rentbook::error::{RentbookError, Result};
use rentbook::fmt::money;
use rentbook::models::{BankTransaction, Category, Id, TransactionStatus};

use super::Session;

fn flagged(session: &Session) -> Result<Vec<BankTransaction>> {
    let store = session.pipeline.store();
    let mut rows = Vec::new();
    for statement in store.statements_for_user(session.user_id)? {
        rows.extend(
            store
                .bank_transactions_for_statement(statement.id)?
                .into_iter()
                .filter(|t| t.status == TransactionStatus::NeedsReview),
        );
    }
    Ok(rows)
}

pub fn list(session: &Session) -> Result<()> {
    let rows = flagged(session)?;
    if rows.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Reason"]);
    for t in rows {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.transaction_date),
            Cell::new(t.description),
            Cell::new(money(t.amount)),
            Cell::new(t.review_reason.unwrap_or_default()),
        ]);
    }
    println!("Needs review\n{table}");
    Ok(())
}

pub(crate) fn find_category(session: &Session, name: &str) -> Result<Category> {
    ensure_default_categories(session.pipeline.store(), session.user_id)?
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| RentbookError::Validation(format!("no category named '{name}'")))
}

pub fn assign(session: &Session, transaction: Id, category: &str) -> Result<()> {
    let category = find_category(session, category)?;
    let txn = session.pipeline.assign_category(transaction, category.id)?;
    println!(
        "Posted transaction {} ({}) to {}",
        txn.id,
        money(txn.amount),
        category.name
    );
    Ok(())
}

pub fn ignore(session: &Session, transaction: Id) -> Result<()> {
    let txn = session.pipeline.ignore_transaction(transaction)?;
    println!("Ignored transaction {}: {}", txn.id, txn.description);
    Ok(())
}

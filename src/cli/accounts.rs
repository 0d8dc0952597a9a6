use comfy_table::{Cell, Table};

use rentbook::error::Result;
use rentbook::fmt::money;
use rentbook::models::BankAccount;

use super::Session;

pub fn add(session: &Session, name: &str, balance: f64, is_default: bool) -> Result<()> {
    let account = session.pipeline.store().insert_account(BankAccount {
        id: 0,
        user_id: session.user_id,
        name: name.to_string(),
        balance,
        currency: session.currency.clone(),
        is_default,
    })?;
    println!("Added account {}: {}", account.id, account.name);
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let accounts = session.pipeline.store().accounts_for_user(session.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Balance", "Currency", "Default"]);
    for a in accounts {
        table.add_row(vec![
            Cell::new(a.id),
            Cell::new(a.name),
            Cell::new(money(a.balance)),
            Cell::new(a.currency),
            Cell::new(if a.is_default { "yes" } else { "" }),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}

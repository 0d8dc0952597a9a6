use std::collections::HashMap;

use comfy_table::{Cell, Table};

use rentbook::error::Result;
use rentbook::fmt::money;
use rentbook::ledger::add_budget;
use rentbook::models::{Budget, BudgetPeriod, Id};

use super::review::find_category;
use super::{parse_date_arg, Session};

pub fn add(
    session: &Session,
    category: &str,
    amount: f64,
    period: BudgetPeriod,
    name: Option<String>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let category = find_category(session, category)?;
    let start_date = match start {
        Some(s) => parse_date_arg(s)?,
        None => session.pipeline.today(),
    };
    let end_date = end.map(parse_date_arg).transpose()?;
    let budget = add_budget(
        session.pipeline.store(),
        Budget {
            id: 0,
            user_id: session.user_id,
            category_id: category.id,
            name: name.unwrap_or_else(|| category.name.clone()),
            amount,
            period,
            start_date,
            end_date,
        },
    )?;
    println!(
        "Added {} budget {}: {} for {}",
        budget.period,
        budget.id,
        money(budget.amount),
        category.name
    );
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let store = session.pipeline.store();
    let names: HashMap<Id, String> = store
        .categories_for_user(session.user_id)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Category", "Amount", "Period", "From", "Until"]);
    for b in store.budgets_for_user(session.user_id)? {
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(b.name),
            Cell::new(names.get(&b.category_id).cloned().unwrap_or_default()),
            Cell::new(money(b.amount)),
            Cell::new(b.period),
            Cell::new(b.start_date),
            Cell::new(b.end_date.map(|d| d.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Budgets\n{table}");
    Ok(())
}

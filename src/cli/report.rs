use chrono::Datelike;
use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::{RentbookError, Result};
use rentbook::fmt::{money, percent};
use rentbook::ledger::{Granularity, LedgerFilter, LedgerSummary};
use rentbook::models::DateWindow;

use super::{parse_date_arg, parse_month_arg, Session};

fn signed(amount: f64) -> String {
    if amount >= 0.0 {
        money(amount).green().to_string()
    } else {
        money(amount).red().to_string()
    }
}

/// `--from/--to` beat `--month`, which beats `--year`; default is this month.
fn resolve_window(
    session: &Session,
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<String>,
    to_date: Option<String>,
) -> Result<DateWindow> {
    match (from_date, to_date) {
        (Some(from), Some(to)) => return Ok(DateWindow::new(parse_date_arg(&from)?, parse_date_arg(&to)?)),
        (None, None) => {}
        _ => {
            return Err(RentbookError::Validation(
                "--from and --to must be given together".to_string(),
            ))
        }
    }
    if let Some(m) = month {
        return Ok(DateWindow::month_of(parse_month_arg(&m)?));
    }
    if let Some(y) = year {
        return Ok(DateWindow::calendar_year(y));
    }
    Ok(DateWindow::month_of(session.pipeline.today()))
}

fn print_summary(summary: &LedgerSummary) {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount"]);

    if !summary.income_by_category.is_empty() {
        table.add_row(vec![Cell::new("INCOME".green().bold()), Cell::new("")]);
        for item in &summary.income_by_category {
            table.add_row(vec![
                Cell::new(format!("  {}", item.category_name)),
                Cell::new(money(item.amount)),
            ]);
        }
    }
    table.add_row(vec![
        Cell::new("Total Income".bold()),
        Cell::new(money(summary.total_income)),
    ]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);

    if !summary.expenses_by_category.is_empty() {
        table.add_row(vec![Cell::new("EXPENSES".red().bold()), Cell::new("")]);
        for item in &summary.expenses_by_category {
            table.add_row(vec![
                Cell::new(format!("  {}", item.category_name)),
                Cell::new(money(item.amount)),
            ]);
        }
    }
    table.add_row(vec![
        Cell::new("Total Expenses".bold()),
        Cell::new(money(summary.total_expenses)),
    ]);
    table.add_row(vec![Cell::new(""), Cell::new("")]);

    let net_label = if summary.net_income >= 0.0 {
        "NET".green().bold()
    } else {
        "NET".red().bold()
    };
    table.add_row(vec![Cell::new(net_label), Cell::new(money(summary.net_income))]);

    println!(
        "Income & Expenses {} to {}\n{table}",
        summary.window.start, summary.window.end
    );
}

pub fn summary(
    session: &Session,
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<String>,
    to_date: Option<String>,
) -> Result<()> {
    let window = resolve_window(session, month, year, from_date, to_date)?;
    let summary = session
        .pipeline
        .summarize(session.user_id, window, &LedgerFilter::default())?;
    print_summary(&summary);
    Ok(())
}

pub fn periods(session: &Session, year: Option<i32>, quarterly: bool) -> Result<()> {
    let year = year.unwrap_or_else(|| session.pipeline.today().year());
    let granularity = if quarterly {
        Granularity::Quarterly
    } else {
        Granularity::Monthly
    };
    let rows = session.pipeline.period_totals(session.user_id, year, granularity)?;

    let mut table = Table::new();
    table.set_header(vec!["Period", "Income", "Expenses", "Net"]);
    for p in &rows {
        table.add_row(vec![
            Cell::new(&p.label),
            Cell::new(money(p.income)),
            Cell::new(money(p.expenses)),
            Cell::new(signed(p.net)),
        ]);
    }
    println!("Totals for {year}\n{table}");
    Ok(())
}

pub fn budgets(session: &Session) -> Result<()> {
    let rows = session.pipeline.budget_variance(session.user_id)?;
    if rows.is_empty() {
        println!("No active budgets.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Budget", "Period", "Window", "Budgeted", "Actual", "Remaining", "Used"]);
    for b in &rows {
        let used = match b.percent_used {
            Some(p) if p > 100.0 => percent(b.percent_used).red().to_string(),
            _ => percent(b.percent_used),
        };
        table.add_row(vec![
            Cell::new(&b.name),
            Cell::new(b.period),
            Cell::new(format!("{} to {}", b.window.start, b.window.end)),
            Cell::new(money(b.budgeted)),
            Cell::new(money(b.actual)),
            Cell::new(signed(b.variance)),
            Cell::new(used),
        ]);
    }
    println!("Budget vs Actual\n{table}");
    Ok(())
}

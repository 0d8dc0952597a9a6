use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::{RentbookError, Result};
use rentbook::fmt::money;
use rentbook::models::Id;

use super::{parse_date_arg, Session};

pub fn open(session: &Session, label: i32, start: Option<&str>) -> Result<()> {
    let start_date = match start {
        Some(s) => parse_date_arg(s)?,
        None => NaiveDate::from_ymd_opt(label, 1, 1)
            .ok_or_else(|| RentbookError::Validation(format!("invalid year {label}")))?,
    };
    let year = session.pipeline.open_tax_year(session.user_id, label, start_date)?;
    println!(
        "Opened tax year {} (ID {}): {} to {}",
        year.label, year.id, year.start_date, year.end_date
    );
    Ok(())
}

pub fn close(session: &Session, id: Id, rate: Option<f64>) -> Result<()> {
    let year = session.pipeline.close_tax_year(id, rate)?;
    println!("Closed tax year {}", year.label.to_string().bold());
    println!("  Income:        {}", money(year.total_income));
    println!("  Expenses:      {}", money(year.total_expenses));
    println!("  Net:           {}", money(year.net_income));
    match (year.tax_rate, year.estimated_tax) {
        (Some(rate), Some(tax)) => println!("  Estimated tax: {} at {rate}%", money(tax)),
        _ => println!("  Estimated tax: (no rate given)"),
    }
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let years = session.pipeline.store().tax_years_for_user(session.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Year", "Start", "End", "Net", "Est. Tax", "Status"]);
    for y in years {
        let status = if y.is_closed {
            "closed".dimmed()
        } else {
            "open".green()
        };
        table.add_row(vec![
            Cell::new(y.id),
            Cell::new(y.label),
            Cell::new(y.start_date),
            Cell::new(y.end_date),
            Cell::new(if y.is_closed { money(y.net_income) } else { String::new() }),
            Cell::new(y.estimated_tax.map(money).unwrap_or_default()),
            Cell::new(status),
        ]);
    }
    println!("Tax Years\n{table}");
    Ok(())
}

use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::Result;
use rentbook::fmt::money;

use super::payments::status_label;
use super::Session;

pub fn run(session: &Session, refresh: bool) -> Result<()> {
    if refresh {
        let changed = session.pipeline.refresh_payment_statuses(session.user_id)?;
        println!("{} payment status(es) updated", changed.len());
    }

    let late = session.pipeline.late_tenants(session.user_id)?;
    if late.is_empty() {
        println!("{}", "Everyone is paid up.".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Tenant", "Rent", "Last Due", "Status", "Reason"]);
    for l in &late {
        let (due, status) = match &l.last_payment {
            Some(p) => (p.due_date.to_string(), status_label(p.status).to_string()),
            None => (String::new(), String::new()),
        };
        table.add_row(vec![
            Cell::new(l.tenant.full_name()),
            Cell::new(money(l.tenant.rent_amount)),
            Cell::new(due),
            Cell::new(status),
            Cell::new(l.reason.describe()),
        ]);
    }
    println!("Late Tenants ({})\n{table}", late.len().to_string().red().bold());
    Ok(())
}

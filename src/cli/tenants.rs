use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::{RentbookError, Result};
use rentbook::fmt::money;
use rentbook::models::{Id, Tenant};
use rentbook::store::require;

use super::Session;

pub fn add(
    session: &Session,
    first_name: &str,
    last_name: &str,
    rent: f64,
    due_day: u32,
    email: Option<String>,
    phone: Option<String>,
) -> Result<()> {
    if !(1..=28).contains(&due_day) {
        return Err(RentbookError::Validation(format!(
            "rent due day must be between 1 and 28, got {due_day}"
        )));
    }
    if !rent.is_finite() || rent <= 0.0 {
        return Err(RentbookError::Validation(format!("rent must be positive, got {rent}")));
    }
    let tenant = session.pipeline.store().insert_tenant(Tenant {
        id: 0,
        user_id: session.user_id,
        property_id: None,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email,
        phone,
        lease_start: None,
        lease_end: None,
        rent_amount: rent,
        rent_due_day: due_day,
        active: true,
    })?;
    println!("Added tenant {}: {}", tenant.id, tenant.full_name());
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let tenants = session.pipeline.store().tenants_for_user(session.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Rent", "Due Day", "Email", "Status"]);
    for t in tenants {
        let status = if t.active {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.full_name()),
            Cell::new(money(t.rent_amount)),
            Cell::new(t.rent_due_day),
            Cell::new(t.email.unwrap_or_default()),
            Cell::new(status),
        ]);
    }
    println!("Tenants\n{table}");
    Ok(())
}

pub fn deactivate(session: &Session, id: Id) -> Result<()> {
    let store = session.pipeline.store();
    let mut tenant = require(store.tenant(id)?, "tenant", id)?;
    tenant.active = false;
    store.update_tenant(&tenant)?;
    println!("Deactivated tenant {}: {}", tenant.id, tenant.full_name());
    Ok(())
}

use std::collections::HashMap;

use colored::Colorize;
use comfy_table::{Cell, Table};

use rentbook::error::Result;
use rentbook::models::{DeliveryChannel, Id, ReminderStatus};
use rentbook::reminders::{self, Dispatcher};

use super::{parse_date_arg, Session};

pub fn schedule(session: &Session) -> Result<()> {
    let created = session.pipeline.schedule_reminders(session.user_id)?;
    println!("{} reminder(s) scheduled", created.len());
    for r in &created {
        println!("  {} [{}] {}", r.id, r.reminder_type, r.subject);
    }
    Ok(())
}

pub fn deliver(session: &Session) -> Result<()> {
    let report = session
        .pipeline
        .deliver_reminders(session.user_id, &mut Dispatcher::default())?;
    let failed = if report.failed > 0 {
        report.failed.to_string().red().to_string()
    } else {
        report.failed.to_string()
    };
    println!("{} sent, {failed} failed", report.sent);
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let store = session.pipeline.store();
    let names: HashMap<Id, String> = store
        .tenants_for_user(session.user_id)?
        .into_iter()
        .map(|t| (t.id, t.full_name()))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Tenant", "Type", "Status", "Scheduled", "Channel", "Subject", "Tries"]);
    for r in store.reminders_for_user(session.user_id)? {
        let status = match r.status {
            ReminderStatus::Sent if r.response_received => "replied".green(),
            ReminderStatus::Sent => "sent".green(),
            ReminderStatus::Failed => "failed".red(),
            ReminderStatus::Cancelled => "cancelled".dimmed(),
            ReminderStatus::Pending => "pending".yellow(),
        };
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(names.get(&r.tenant_id).cloned().unwrap_or_default()),
            Cell::new(r.reminder_type),
            Cell::new(status),
            Cell::new(r.scheduled_date),
            Cell::new(r.channel),
            Cell::new(r.subject),
            Cell::new(r.attempts),
        ]);
    }
    println!("Reminders\n{table}");
    Ok(())
}

pub fn custom(
    session: &Session,
    payment: Id,
    subject: &str,
    message: &str,
    date: Option<&str>,
    channel: DeliveryChannel,
) -> Result<()> {
    let date = match date {
        Some(d) => parse_date_arg(d)?,
        None => session.pipeline.today(),
    };
    let r = reminders::create_custom_reminder(
        session.pipeline.store(),
        payment,
        subject,
        message,
        date,
        channel,
    )?;
    println!("Scheduled reminder {} for {}", r.id, r.scheduled_date);
    Ok(())
}

pub fn retry(session: &Session, id: Id) -> Result<()> {
    let r = reminders::retry(session.pipeline.store(), id, session.pipeline.today())?;
    println!("Reminder {} queued for {}", r.id, r.scheduled_date);
    Ok(())
}

pub fn cancel(session: &Session, id: Id) -> Result<()> {
    let r = reminders::cancel(session.pipeline.store(), id)?;
    println!("Reminder {} cancelled", r.id);
    Ok(())
}

pub fn respond(session: &Session, id: Id, message: Option<&str>) -> Result<()> {
    let r = reminders::record_response(session.pipeline.store(), id, session.pipeline.today(), message)?;
    println!("Recorded reply to reminder {}", r.id);
    Ok(())
}

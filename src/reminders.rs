use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detector::late_tenants;
use crate::error::{RentbookError, Result};
use crate::models::{
    same_month, DeliveryChannel, Id, Payment, PaymentReminder, PaymentStatus, ReminderStatus,
    ReminderType, Tenant,
};
use crate::store::{require, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// Days past due after which the reminder escalates to `final`.
    pub grace_days: u32,
    pub channel: DeliveryChannel,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            grace_days: 5,
            channel: DeliveryChannel::Email,
        }
    }
}

pub fn reminder_type_for(due_date: NaiveDate, today: NaiveDate, grace_days: u32) -> ReminderType {
    let days_past_due = (today - due_date).num_days();
    if days_past_due < 0 {
        ReminderType::Upcoming
    } else if days_past_due == 0 {
        ReminderType::Due
    } else if days_past_due > i64::from(grace_days) {
        ReminderType::Final
    } else {
        ReminderType::Overdue
    }
}

fn compose(kind: ReminderType, tenant: &Tenant, payment: &Payment, today: NaiveDate) -> (String, String) {
    let amount = format!("{:.2}", payment.amount);
    let due = payment.due_date;
    let days = (today - due).num_days();
    let subject = match kind {
        ReminderType::Upcoming => format!("Rent due on {due}"),
        ReminderType::Due => "Rent is due today".to_string(),
        ReminderType::Overdue => format!("Rent overdue since {due}"),
        ReminderType::Final => format!("Final notice: rent overdue since {due}"),
        ReminderType::Custom => format!("About your rent due {due}"),
    };
    let body = match kind {
        ReminderType::Upcoming => format!("your rent of {amount} is due on {due}."),
        ReminderType::Due => format!("your rent of {amount} is due today."),
        ReminderType::Overdue | ReminderType::Final | ReminderType::Custom => {
            format!("your rent of {amount} was due on {due} and is {days} days overdue.")
        }
    };
    (subject, format!("Hi {}, {body}", tenant.first_name))
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

fn current_payment(store: &dyn Store, tenant: &Tenant, today: NaiveDate) -> Result<Payment> {
    if let Some(p) = store
        .payments_for_tenant(tenant.id)?
        .into_iter()
        .find(|p| same_month(p.due_date, today))
    {
        return Ok(p);
    }
    let expected = store.insert_payment(Payment {
        id: 0,
        user_id: tenant.user_id,
        tenant_id: tenant.id,
        property_id: tenant.property_id,
        amount: tenant.rent_amount,
        due_date: tenant.due_date_in_month_of(today),
        date_paid: None,
        status: PaymentStatus::Pending,
        transaction_id: None,
        notes: Some("Expected rent".to_string()),
    })?;
    info!(tenant_id = tenant.id, payment_id = expected.id, due = %expected.due_date, "created expected payment");
    Ok(expected)
}

/// Creates one reminder per late payer whose current payment has no pending
/// or sent reminder yet.
pub fn schedule_reminders(
    store: &dyn Store,
    user_id: Id,
    today: NaiveDate,
    policy: &ReminderPolicy,
) -> Result<Vec<PaymentReminder>> {
    let mut created = Vec::new();
    for late in late_tenants(store, user_id, today)? {
        let tenant = late.tenant;
        let payment = current_payment(store, &tenant, today)?;
        if matches!(payment.status, PaymentStatus::Received | PaymentStatus::Waived) {
            continue;
        }
        let covered = store
            .reminders_for_payment(payment.id)?
            .iter()
            .any(|r| matches!(r.status, ReminderStatus::Pending | ReminderStatus::Sent));
        if covered {
            continue;
        }

        let kind = reminder_type_for(payment.due_date, today, policy.grace_days);
        let (subject, message) = compose(kind, &tenant, &payment, today);
        let reminder = store.insert_reminder(PaymentReminder {
            id: 0,
            user_id,
            payment_id: payment.id,
            tenant_id: tenant.id,
            reminder_type: kind,
            status: ReminderStatus::Pending,
            scheduled_date: today,
            sent_date: None,
            subject,
            message,
            channel: policy.channel,
            response_received: false,
            response_date: None,
            response_message: None,
            failure_reason: None,
            attempts: 0,
        })?;
        created.push(reminder);
    }
    info!(user_id, created = created.len(), "reminders scheduled");
    Ok(created)
}

pub fn create_custom_reminder(
    store: &dyn Store,
    payment_id: Id,
    subject: &str,
    message: &str,
    scheduled_date: NaiveDate,
    channel: DeliveryChannel,
) -> Result<PaymentReminder> {
    if subject.trim().is_empty() || message.trim().is_empty() {
        return Err(RentbookError::Validation(
            "a custom reminder needs a subject and a message".to_string(),
        ));
    }
    let payment = require(store.payment(payment_id)?, "payment", payment_id)?;
    store.insert_reminder(PaymentReminder {
        id: 0,
        user_id: payment.user_id,
        payment_id,
        tenant_id: payment.tenant_id,
        reminder_type: ReminderType::Custom,
        status: ReminderStatus::Pending,
        scheduled_date,
        sent_date: None,
        subject: subject.trim().to_string(),
        message: message.trim().to_string(),
        channel,
        response_received: false,
        response_date: None,
        response_message: None,
        failure_reason: None,
        attempts: 0,
    })
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

fn transition(
    store: &dyn Store,
    reminder_id: Id,
    from: ReminderStatus,
    action: &str,
    apply: impl FnOnce(&mut PaymentReminder),
) -> Result<PaymentReminder> {
    let mut reminder = require(store.reminder(reminder_id)?, "payment reminder", reminder_id)?;
    if reminder.status != from {
        return Err(RentbookError::Conflict(format!(
            "cannot {action} reminder {reminder_id}: it is {}",
            reminder.status
        )));
    }
    apply(&mut reminder);
    store.update_reminder(&reminder)?;
    Ok(reminder)
}

pub fn mark_sent(store: &dyn Store, reminder_id: Id, today: NaiveDate) -> Result<PaymentReminder> {
    transition(store, reminder_id, ReminderStatus::Pending, "send", |r| {
        r.status = ReminderStatus::Sent;
        r.sent_date = Some(today);
        r.failure_reason = None;
        r.attempts += 1;
    })
}

pub fn mark_failed(store: &dyn Store, reminder_id: Id, reason: &str) -> Result<PaymentReminder> {
    transition(store, reminder_id, ReminderStatus::Pending, "fail", |r| {
        r.status = ReminderStatus::Failed;
        r.failure_reason = Some(reason.to_string());
        r.attempts += 1;
    })
}

/// Puts a failed reminder back in the queue for `today`.
pub fn retry(store: &dyn Store, reminder_id: Id, today: NaiveDate) -> Result<PaymentReminder> {
    transition(store, reminder_id, ReminderStatus::Failed, "retry", |r| {
        r.status = ReminderStatus::Pending;
        r.scheduled_date = today;
    })
}

pub fn cancel(store: &dyn Store, reminder_id: Id) -> Result<PaymentReminder> {
    transition(store, reminder_id, ReminderStatus::Pending, "cancel", |r| {
        r.status = ReminderStatus::Cancelled;
    })
}

/// Annotates a sent reminder with the tenant's reply. Status stays `sent`.
pub fn record_response(
    store: &dyn Store,
    reminder_id: Id,
    date: NaiveDate,
    message: Option<&str>,
) -> Result<PaymentReminder> {
    transition(store, reminder_id, ReminderStatus::Sent, "annotate", |r| {
        r.response_received = true;
        r.response_date = Some(date);
        r.response_message = message.map(str::to_string);
    })
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Sends a reminder somewhere outside the process.
pub trait Notifier {
    fn name(&self) -> &str;
    fn deliver(&self, reminder: &PaymentReminder, tenant: &Tenant) -> std::result::Result<(), DeliveryError>;
}

/// Writes the reminder to the log instead of sending it.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, reminder: &PaymentReminder, tenant: &Tenant) -> std::result::Result<(), DeliveryError> {
        info!(
            reminder_id = reminder.id,
            tenant = %tenant.full_name(),
            channel = %reminder.channel,
            subject = %reminder.subject,
            "reminder delivered"
        );
        Ok(())
    }
}

/// Round-robin over the configured notifiers. The caller owns the rotation.
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
    cursor: usize,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers, cursor: 0 }
    }

    fn next(&mut self) -> Option<&dyn Notifier> {
        if self.notifiers.is_empty() {
            return None;
        }
        let i = self.cursor % self.notifiers.len();
        self.cursor = (i + 1) % self.notifiers.len();
        Some(self.notifiers[i].as_ref())
    }

    pub fn dispatch(
        &mut self,
        reminder: &PaymentReminder,
        tenant: &Tenant,
    ) -> std::result::Result<(), DeliveryError> {
        let notifier = self
            .next()
            .ok_or_else(|| DeliveryError::Unavailable("no notifiers configured".to_string()))?;
        notifier.deliver(reminder, tenant)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(vec![Box::new(LogNotifier)])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Attempts every pending reminder scheduled on or before `today`.
pub fn deliver_due(
    store: &dyn Store,
    user_id: Id,
    today: NaiveDate,
    dispatcher: &mut Dispatcher,
) -> Result<DeliveryReport> {
    let mut report = DeliveryReport::default();
    for reminder in store.reminders_for_user(user_id)? {
        if reminder.status != ReminderStatus::Pending || reminder.scheduled_date > today {
            continue;
        }
        let tenant = require(store.tenant(reminder.tenant_id)?, "tenant", reminder.tenant_id)?;
        match dispatcher.dispatch(&reminder, &tenant) {
            Ok(()) => {
                mark_sent(store, reminder.id, today)?;
                report.sent += 1;
            }
            Err(e) => {
                warn!(reminder_id = reminder.id, tenant_id = tenant.id, error = %e, "reminder delivery failed");
                mark_failed(store, reminder.id, &e.to_string())?;
                report.failed += 1;
            }
        }
    }
    info!(user_id, sent = report.sent, failed = report.failed, "reminders delivered");
    Ok(report)
}

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{same_month, Id, Payment, PaymentStatus, Tenant};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LateReason {
    NoPayments,
    NoPaymentThisPeriod,
    MarkedLate,
}

impl LateReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NoPayments => "no payments on record",
            Self::NoPaymentThisPeriod => "no payment due this month",
            Self::MarkedLate => "latest payment is late",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatePayer {
    pub tenant: Tenant,
    pub last_payment: Option<Payment>,
    pub reason: LateReason,
}

/// Decides lateness from a tenant's most recent payment alone.
pub fn late_reason(latest: Option<&Payment>, today: NaiveDate) -> Option<LateReason> {
    match latest {
        None => Some(LateReason::NoPayments),
        Some(p) if !same_month(p.due_date, today) => Some(LateReason::NoPaymentThisPeriod),
        Some(p) if matches!(p.status, PaymentStatus::Late | PaymentStatus::Overdue) => {
            Some(LateReason::MarkedLate)
        }
        Some(_) => None,
    }
}

/// Active tenants whose latest payment puts them behind. Reads only.
pub fn late_tenants(store: &dyn Store, user_id: Id, today: NaiveDate) -> Result<Vec<LatePayer>> {
    let mut late = Vec::new();
    for tenant in store.tenants_for_user(user_id)? {
        if !tenant.active {
            continue;
        }
        let latest = store.payments_for_tenant(tenant.id)?.into_iter().next();
        if let Some(reason) = late_reason(latest.as_ref(), today) {
            debug!(tenant_id = tenant.id, ?reason, "late payer");
            late.push(LatePayer {
                tenant,
                last_payment: latest,
                reason,
            });
        }
    }
    Ok(late)
}

/// Where an unpaid payment should stand on `today`, if it should move.
pub fn next_status(payment: &Payment, today: NaiveDate, grace_days: u32) -> Option<PaymentStatus> {
    let days_late = (today - payment.due_date).num_days();
    match payment.status {
        PaymentStatus::Pending | PaymentStatus::Late if days_late > i64::from(grace_days) => {
            Some(PaymentStatus::Overdue)
        }
        PaymentStatus::Pending if days_late > 0 => Some(PaymentStatus::Late),
        _ => None,
    }
}

/// Moves pending payments to late, and late ones to overdue once the grace
/// period runs out. Returns the payments that changed.
pub fn refresh_payment_statuses(
    store: &dyn Store,
    user_id: Id,
    today: NaiveDate,
    grace_days: u32,
) -> Result<Vec<Payment>> {
    let mut changed = Vec::new();
    for mut payment in store.payments_for_user(user_id)? {
        if let Some(status) = next_status(&payment, today, grace_days) {
            payment.status = status;
            store.update_payment(&payment)?;
            changed.push(payment);
        }
    }
    info!(user_id, changed = changed.len(), "payment statuses refreshed");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{add_payment, add_tenant, d, test_store};

    #[test]
    fn test_tenant_without_payments_is_late() {
        let store = test_store();
        let t = add_tenant(&store, 1, "Ana", 800.0);
        let late = late_tenants(&store, 1, d("2024-03-15")).unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].tenant.id, t.id);
        assert_eq!(late[0].reason, LateReason::NoPayments);
        assert!(late[0].last_payment.is_none());
    }

    #[test]
    fn test_latest_payment_in_another_month_is_late() {
        let store = test_store();
        let t = add_tenant(&store, 1, "Ana", 800.0);
        add_payment(&store, &t, "2024-02-01", PaymentStatus::Received);
        let late = late_tenants(&store, 1, d("2024-03-15")).unwrap();
        assert_eq!(late[0].reason, LateReason::NoPaymentThisPeriod);
    }

    #[test]
    fn test_current_payment_marked_late() {
        let store = test_store();
        let t = add_tenant(&store, 1, "Ana", 800.0);
        add_payment(&store, &t, "2024-03-01", PaymentStatus::Overdue);
        let late = late_tenants(&store, 1, d("2024-03-15")).unwrap();
        assert_eq!(late[0].reason, LateReason::MarkedLate);
    }

    #[test]
    fn test_each_tenant_listed_at_most_once() {
        let store = test_store();
        let paid = add_tenant(&store, 1, "Paid", 900.0);
        let behind = add_tenant(&store, 1, "Behind", 700.0);
        let mut gone = add_tenant(&store, 1, "Gone", 600.0);
        gone.active = false;
        store.update_tenant(&gone).unwrap();
        add_tenant(&store, 2, "OtherLandlord", 500.0);

        add_payment(&store, &paid, "2024-03-01", PaymentStatus::Received);
        add_payment(&store, &behind, "2024-01-01", PaymentStatus::Late);
        add_payment(&store, &behind, "2024-02-01", PaymentStatus::Late);
        add_payment(&store, &behind, "2024-02-01", PaymentStatus::Overdue);

        let late = late_tenants(&store, 1, d("2024-03-15")).unwrap();
        let ids: Vec<Id> = late.iter().map(|l| l.tenant.id).collect();
        assert_eq!(ids, vec![behind.id]);
        // Ties on due date resolve to the newest row.
        assert_eq!(late[0].last_payment.as_ref().unwrap().status, PaymentStatus::Overdue);
    }

    #[test]
    fn test_pending_current_payment_is_not_late() {
        let store = test_store();
        let t = add_tenant(&store, 1, "Ana", 800.0);
        add_payment(&store, &t, "2024-03-01", PaymentStatus::Pending);
        assert!(late_tenants(&store, 1, d("2024-03-15")).unwrap().is_empty());
    }

    #[test]
    fn test_refresh_statuses() {
        let store = test_store();
        let t = add_tenant(&store, 1, "Ana", 800.0);
        let due_today = add_payment(&store, &t, "2024-03-10", PaymentStatus::Pending);
        let just_late = add_payment(&store, &t, "2024-03-07", PaymentStatus::Pending);
        let long_late = add_payment(&store, &t, "2024-02-01", PaymentStatus::Late);
        let received = add_payment(&store, &t, "2024-01-01", PaymentStatus::Received);

        let changed = refresh_payment_statuses(&store, 1, d("2024-03-10"), 5).unwrap();
        assert_eq!(changed.len(), 2);

        let status = |id| store.payment(id).unwrap().unwrap().status;
        assert_eq!(status(due_today.id), PaymentStatus::Pending);
        assert_eq!(status(just_late.id), PaymentStatus::Late);
        assert_eq!(status(long_late.id), PaymentStatus::Overdue);
        assert_eq!(status(received.id), PaymentStatus::Received);
    }
}

//! Shared fixtures for unit tests.

use chrono::NaiveDate;

use crate::models::*;
use crate::store::{MemoryStore, Store};

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn test_store() -> MemoryStore {
    MemoryStore::new()
}

pub fn add_account(store: &dyn Store, user_id: Id, balance: f64) -> BankAccount {
    store
        .insert_account(BankAccount {
            id: 0,
            user_id,
            name: "Operating".into(),
            balance,
            currency: "USD".into(),
            is_default: true,
        })
        .unwrap()
}

pub fn add_tenant(store: &dyn Store, user_id: Id, first_name: &str, rent: f64) -> Tenant {
    store
        .insert_tenant(Tenant {
            id: 0,
            user_id,
            property_id: None,
            first_name: first_name.into(),
            last_name: "Tenant".into(),
            email: Some(format!("{}@example.com", first_name.to_lowercase())),
            phone: None,
            lease_start: None,
            lease_end: None,
            rent_amount: rent,
            rent_due_day: 1,
            active: true,
        })
        .unwrap()
}

pub fn add_payment(store: &dyn Store, tenant: &Tenant, due: &str, status: PaymentStatus) -> Payment {
    let date_paid = (status == PaymentStatus::Received).then(|| d(due));
    store
        .insert_payment(Payment {
            id: 0,
            user_id: tenant.user_id,
            tenant_id: tenant.id,
            property_id: tenant.property_id,
            amount: tenant.rent_amount,
            due_date: d(due),
            date_paid,
            status,
            transaction_id: None,
            notes: None,
        })
        .unwrap()
}

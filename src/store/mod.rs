//! Persistence seam. Every core component talks to a `Store`; the process
//! picks the concrete backend once at start-up and hands it down.

pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RentbookError, Result};
use crate::models::{
    BankAccount, BankStatement, BankTransaction, Budget, Category, DateWindow, Id, LedgerEntry,
    Payment, PaymentReminder, Property, TaxYear, Tenant,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Which backend the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

/// Everything the classifier changes for one bank transaction. A store
/// applies all of it or none of it. Marking a payment received that is
/// already received is a `Conflict`.
#[derive(Debug, Clone)]
pub struct ClassificationCommit {
    pub transaction: BankTransaction,
    pub payment: Option<Payment>,
    /// Posted when the transaction gains a category; `id` is assigned on insert.
    pub ledger_entry: Option<LedgerEntry>,
    pub statement_reconciled: bool,
}

pub trait Store: Send + Sync {
    fn insert_property(&self, property: Property) -> Result<Property>;
    fn property(&self, id: Id) -> Result<Option<Property>>;

    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant>;
    fn tenant(&self, id: Id) -> Result<Option<Tenant>>;
    fn tenants_for_user(&self, user_id: Id) -> Result<Vec<Tenant>>;
    fn update_tenant(&self, tenant: &Tenant) -> Result<()>;

    fn insert_payment(&self, payment: Payment) -> Result<Payment>;
    fn payment(&self, id: Id) -> Result<Option<Payment>>;
    /// Most recent first: `due_date` descending, ties broken by id descending.
    fn payments_for_tenant(&self, tenant_id: Id) -> Result<Vec<Payment>>;
    fn payments_for_user(&self, user_id: Id) -> Result<Vec<Payment>>;
    fn update_payment(&self, payment: &Payment) -> Result<()>;

    fn insert_account(&self, account: BankAccount) -> Result<BankAccount>;
    fn account(&self, id: Id) -> Result<Option<BankAccount>>;
    fn accounts_for_user(&self, user_id: Id) -> Result<Vec<BankAccount>>;
    fn update_account(&self, account: &BankAccount) -> Result<()>;

    fn insert_category(&self, category: Category) -> Result<Category>;
    fn category(&self, id: Id) -> Result<Option<Category>>;
    fn categories_for_user(&self, user_id: Id) -> Result<Vec<Category>>;

    fn insert_statement(&self, statement: BankStatement) -> Result<BankStatement>;
    fn statement(&self, id: Id) -> Result<Option<BankStatement>>;
    fn statements_for_user(&self, user_id: Id) -> Result<Vec<BankStatement>>;
    /// Ignores statements whose extraction failed.
    fn statement_by_checksum(&self, account_id: Id, checksum: &str) -> Result<Option<BankStatement>>;
    /// Flips `processed` from false to true. A second call is a `Conflict`.
    fn mark_statement_processed(
        &self,
        id: Id,
        transaction_count: i64,
        balance_verified: bool,
    ) -> Result<()>;

    fn insert_bank_transactions(&self, rows: Vec<BankTransaction>) -> Result<Vec<BankTransaction>>;
    fn bank_transaction(&self, id: Id) -> Result<Option<BankTransaction>>;
    /// Statement order: `transaction_date` ascending, then id.
    fn bank_transactions_for_statement(&self, statement_id: Id) -> Result<Vec<BankTransaction>>;
    fn commit_classification(&self, commit: &ClassificationCommit) -> Result<Option<LedgerEntry>>;

    fn insert_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry>;
    fn ledger_entries(&self, user_id: Id, window: DateWindow) -> Result<Vec<LedgerEntry>>;

    fn insert_budget(&self, budget: Budget) -> Result<Budget>;
    fn budgets_for_user(&self, user_id: Id) -> Result<Vec<Budget>>;

    fn insert_tax_year(&self, tax_year: TaxYear) -> Result<TaxYear>;
    fn tax_year(&self, id: Id) -> Result<Option<TaxYear>>;
    fn tax_years_for_user(&self, user_id: Id) -> Result<Vec<TaxYear>>;
    /// Writes the closing snapshot. `Conflict` if the row is already closed.
    fn close_tax_year(&self, tax_year: &TaxYear) -> Result<()>;

    /// `Conflict` if a pending reminder already exists for the same payment and type.
    fn insert_reminder(&self, reminder: PaymentReminder) -> Result<PaymentReminder>;
    fn reminder(&self, id: Id) -> Result<Option<PaymentReminder>>;
    fn reminders_for_payment(&self, payment_id: Id) -> Result<Vec<PaymentReminder>>;
    fn reminders_for_user(&self, user_id: Id) -> Result<Vec<PaymentReminder>>;
    /// Same duplicate rule as `insert_reminder` when the update leaves it pending.
    fn update_reminder(&self, reminder: &PaymentReminder) -> Result<()>;
}

/// Builds the configured backend. SQLite lives at `<data_dir>/rentbook.db`.
pub fn open(kind: StorageKind, data_dir: &Path) -> Result<Arc<dyn Store>> {
    match kind {
        StorageKind::Sqlite => {
            std::fs::create_dir_all(data_dir)?;
            Ok(Arc::new(SqliteStore::open(&data_dir.join("rentbook.db"))?))
        }
        StorageKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

pub fn require<T>(found: Option<T>, entity: &'static str, id: Id) -> Result<T> {
    found.ok_or_else(|| RentbookError::not_found(entity, id))
}

pub(crate) fn received_message(payment_id: Id) -> String {
    format!("payment {payment_id} was already received")
}

pub(crate) fn duplicate_pending_message(reminder: &PaymentReminder) -> String {
    format!(
        "payment {} already has a pending {} reminder",
        reminder.payment_id, reminder.reminder_type
    )
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::models::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn tenant(user_id: Id) -> Tenant {
        Tenant {
            id: 0,
            user_id,
            property_id: None,
            first_name: "Mara".into(),
            last_name: "Quinn".into(),
            email: Some("mara@example.com".into()),
            phone: None,
            lease_start: Some(d("2023-09-01")),
            lease_end: None,
            rent_amount: 950.0,
            rent_due_day: 1,
            active: true,
        }
    }

    fn payment(user_id: Id, tenant_id: Id, due: &str) -> Payment {
        Payment {
            id: 0,
            user_id,
            tenant_id,
            property_id: None,
            amount: 950.0,
            due_date: d(due),
            date_paid: None,
            status: PaymentStatus::Pending,
            transaction_id: None,
            notes: None,
        }
    }

    fn reminder(payment: &Payment, kind: ReminderType) -> PaymentReminder {
        PaymentReminder {
            id: 0,
            user_id: payment.user_id,
            payment_id: payment.id,
            tenant_id: payment.tenant_id,
            reminder_type: kind,
            status: ReminderStatus::Pending,
            scheduled_date: payment.due_date,
            sent_date: None,
            subject: "Rent".into(),
            message: "Please pay".into(),
            channel: DeliveryChannel::Email,
            response_received: false,
            response_date: None,
            response_message: None,
            failure_reason: None,
            attempts: 0,
        }
    }

    /// The same sequence must behave identically on every backend.
    fn exercise_contract(store: &dyn Store) {
        let t = store.insert_tenant(tenant(1)).unwrap();
        assert!(t.id > 0);
        assert_eq!(store.tenant(t.id).unwrap().unwrap().rent_amount, 950.0);

        let older = store.insert_payment(payment(1, t.id, "2024-02-01")).unwrap();
        let newer = store.insert_payment(payment(1, t.id, "2024-03-01")).unwrap();
        let ordered = store.payments_for_tenant(t.id).unwrap();
        assert_eq!(ordered.iter().map(|p| p.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

        let account = store
            .insert_account(BankAccount {
                id: 0,
                user_id: 1,
                name: "Operating".into(),
                balance: 0.0,
                currency: "USD".into(),
                is_default: true,
            })
            .unwrap();
        let rent = store
            .insert_category(Category {
                id: 0,
                user_id: 1,
                name: "Rent Income".into(),
                category_type: EntryType::Income,
                is_default: true,
            })
            .unwrap();

        let statement = store
            .insert_statement(BankStatement {
                id: 0,
                user_id: 1,
                account_id: account.id,
                start_date: d("2024-03-01"),
                end_date: d("2024-03-31"),
                starting_balance: 0.0,
                ending_balance: 950.0,
                transaction_count: 0,
                processed: false,
                reconciled: false,
                balance_verified: false,
                processing_error: None,
                checksum: Some("abc".into()),
                source_name: None,
                uploaded_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(
            store.statement_by_checksum(account.id, "abc").unwrap().map(|s| s.id),
            Some(statement.id)
        );
        let rows = store
            .insert_bank_transactions(vec![BankTransaction {
                id: 0,
                statement_id: statement.id,
                account_id: account.id,
                transaction_date: d("2024-03-02"),
                description: "RENT MARA".into(),
                amount: 950.0,
                is_deposit: true,
                balance: None,
                reference: None,
                counterparty: None,
                status: TransactionStatus::Unprocessed,
                category_id: None,
                tenant_id: None,
                payment_id: None,
                property_id: None,
                reconciled: false,
                review_reason: None,
            }])
            .unwrap();
        store.mark_statement_processed(statement.id, 1, true).unwrap();
        assert!(matches!(
            store.mark_statement_processed(statement.id, 1, true),
            Err(RentbookError::Conflict(_))
        ));

        let mut txn = rows[0].clone();
        txn.status = TransactionStatus::Matched;
        txn.category_id = Some(rent.id);
        txn.tenant_id = Some(t.id);
        txn.payment_id = Some(newer.id);
        txn.reconciled = true;
        let mut paid = newer.clone();
        paid.mark_received(d("2024-03-02"), Some(txn.id));
        let entry = store
            .commit_classification(&ClassificationCommit {
                transaction: txn.clone(),
                payment: Some(paid),
                ledger_entry: Some(LedgerEntry {
                    id: 0,
                    user_id: 1,
                    date: d("2024-03-02"),
                    description: "RENT MARA".into(),
                    amount: 950.0,
                    entry_type: EntryType::Income,
                    category_id: Some(rent.id),
                    property_id: None,
                    bank_transaction_id: Some(txn.id),
                }),
                statement_reconciled: true,
            })
            .unwrap()
            .unwrap();
        assert!(entry.id > 0);
        assert!(store.payment(newer.id).unwrap().unwrap().is_received());
        assert_eq!(
            store.bank_transaction(txn.id).unwrap().unwrap().status,
            TransactionStatus::Matched
        );
        let s = store.statement(statement.id).unwrap().unwrap();
        assert!(s.processed && s.reconciled && s.balance_verified);
        assert_eq!(s.transaction_count, 1);

        let mut again = newer.clone();
        again.mark_received(d("2024-03-09"), Some(txn.id));
        let mut retry = txn.clone();
        retry.status = TransactionStatus::NeedsReview;
        assert!(matches!(
            store.commit_classification(&ClassificationCommit {
                transaction: retry,
                payment: Some(again),
                ledger_entry: None,
                statement_reconciled: false,
            }),
            Err(RentbookError::Conflict(_))
        ));
        assert_eq!(
            store.bank_transaction(txn.id).unwrap().unwrap().status,
            TransactionStatus::Matched
        );
        assert_eq!(store.payment(newer.id).unwrap().unwrap().date_paid, Some(d("2024-03-02")));
        assert!(store.statement(statement.id).unwrap().unwrap().reconciled);

        let march = DateWindow::month_of(d("2024-03-15"));
        assert_eq!(store.ledger_entries(1, march).unwrap().len(), 1);
        assert!(store.ledger_entries(2, march).unwrap().is_empty());

        let first = store.insert_reminder(reminder(&older, ReminderType::Overdue)).unwrap();
        assert!(matches!(
            store.insert_reminder(reminder(&older, ReminderType::Overdue)),
            Err(RentbookError::Conflict(_))
        ));
        store.insert_reminder(reminder(&older, ReminderType::Final)).unwrap();
        let mut sent = first.clone();
        sent.status = ReminderStatus::Sent;
        store.update_reminder(&sent).unwrap();
        store.insert_reminder(reminder(&older, ReminderType::Overdue)).unwrap();
        let mut back = sent.clone();
        back.status = ReminderStatus::Pending;
        assert!(matches!(store.update_reminder(&back), Err(RentbookError::Conflict(_))));
        assert_eq!(store.reminders_for_payment(older.id).unwrap().len(), 3);

        let year = store
            .insert_tax_year(TaxYear {
                id: 0,
                user_id: 1,
                label: 2024,
                start_date: d("2024-01-01"),
                end_date: d("2024-12-31"),
                total_income: 0.0,
                total_expenses: 0.0,
                net_income: 0.0,
                tax_rate: None,
                estimated_tax: None,
                is_closed: false,
                closed_at: None,
            })
            .unwrap();
        let mut closed = year.clone();
        closed.total_income = 950.0;
        closed.net_income = 950.0;
        closed.is_closed = true;
        closed.closed_at = Some(Utc::now());
        store.close_tax_year(&closed).unwrap();
        closed.total_income = 1.0;
        assert!(matches!(store.close_tax_year(&closed), Err(RentbookError::Conflict(_))));
        assert_eq!(store.tax_year(year.id).unwrap().unwrap().total_income, 950.0);

        assert!(matches!(
            store.update_payment(&payment(1, t.id, "2024-04-01")),
            Err(RentbookError::NotFound { .. })
        ));
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_contract(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        exercise_contract(&store);
    }

    #[test]
    fn test_open_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(StorageKind::Sqlite, &dir.path().join("books")).unwrap();
        store.insert_tenant(tenant(1)).unwrap();
        assert!(dir.path().join("books").join("rentbook.db").exists());

        let mem = open(StorageKind::Memory, dir.path()).unwrap();
        assert!(mem.tenants_for_user(1).unwrap().is_empty());
    }
}

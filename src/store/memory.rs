use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{RentbookError, Result};
use crate::models::{
    BankAccount, BankStatement, BankTransaction, Budget, Category, DateWindow, Id, LedgerEntry,
    Payment, PaymentReminder, Property, ReminderStatus, TaxYear, Tenant,
};

use super::{duplicate_pending_message, received_message, ClassificationCommit, Store};

#[derive(Default)]
struct Tables {
    next_id: Id,
    properties: BTreeMap<Id, Property>,
    tenants: BTreeMap<Id, Tenant>,
    payments: BTreeMap<Id, Payment>,
    accounts: BTreeMap<Id, BankAccount>,
    categories: BTreeMap<Id, Category>,
    statements: BTreeMap<Id, BankStatement>,
    bank_transactions: BTreeMap<Id, BankTransaction>,
    ledger: BTreeMap<Id, LedgerEntry>,
    budgets: BTreeMap<Id, Budget>,
    tax_years: BTreeMap<Id, TaxYear>,
    reminders: BTreeMap<Id, PaymentReminder>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn has_pending_twin(&self, reminder: &PaymentReminder) -> bool {
        reminder.status == ReminderStatus::Pending
            && self.reminders.values().any(|other| {
                other.id != reminder.id
                    && other.payment_id == reminder.payment_id
                    && other.reminder_type == reminder.reminder_type
                    && other.status == ReminderStatus::Pending
            })
    }
}

/// Process-local backend. One lock guards every table, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RentbookError::Other("memory store lock poisoned".to_string()))
    }
}

fn replace<T: Clone>(map: &mut BTreeMap<Id, T>, id: Id, value: &T, entity: &'static str) -> Result<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(RentbookError::not_found(entity, id)),
    }
}

fn owned_by<T: Clone>(map: &BTreeMap<Id, T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    map.values().filter(|v| keep(v)).cloned().collect()
}

impl Store for MemoryStore {
    fn insert_property(&self, mut property: Property) -> Result<Property> {
        let mut t = self.lock()?;
        property.id = t.next_id();
        t.properties.insert(property.id, property.clone());
        Ok(property)
    }

    fn property(&self, id: Id) -> Result<Option<Property>> {
        Ok(self.lock()?.properties.get(&id).cloned())
    }

    fn insert_tenant(&self, mut tenant: Tenant) -> Result<Tenant> {
        let mut t = self.lock()?;
        tenant.id = t.next_id();
        t.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    fn tenant(&self, id: Id) -> Result<Option<Tenant>> {
        Ok(self.lock()?.tenants.get(&id).cloned())
    }

    fn tenants_for_user(&self, user_id: Id) -> Result<Vec<Tenant>> {
        Ok(owned_by(&self.lock()?.tenants, |t| t.user_id == user_id))
    }

    fn update_tenant(&self, tenant: &Tenant) -> Result<()> {
        replace(&mut self.lock()?.tenants, tenant.id, tenant, "tenant")
    }

    fn insert_payment(&self, mut payment: Payment) -> Result<Payment> {
        let mut t = self.lock()?;
        payment.id = t.next_id();
        t.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    fn payment(&self, id: Id) -> Result<Option<Payment>> {
        Ok(self.lock()?.payments.get(&id).cloned())
    }

    fn payments_for_tenant(&self, tenant_id: Id) -> Result<Vec<Payment>> {
        let mut rows = owned_by(&self.lock()?.payments, |p| p.tenant_id == tenant_id);
        rows.sort_by(|a, b| b.due_date.cmp(&a.due_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn payments_for_user(&self, user_id: Id) -> Result<Vec<Payment>> {
        let mut rows = owned_by(&self.lock()?.payments, |p| p.user_id == user_id);
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn update_payment(&self, payment: &Payment) -> Result<()> {
        replace(&mut self.lock()?.payments, payment.id, payment, "payment")
    }

    fn insert_account(&self, mut account: BankAccount) -> Result<BankAccount> {
        let mut t = self.lock()?;
        account.id = t.next_id();
        t.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn account(&self, id: Id) -> Result<Option<BankAccount>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    fn accounts_for_user(&self, user_id: Id) -> Result<Vec<BankAccount>> {
        Ok(owned_by(&self.lock()?.accounts, |a| a.user_id == user_id))
    }

    fn update_account(&self, account: &BankAccount) -> Result<()> {
        replace(&mut self.lock()?.accounts, account.id, account, "bank account")
    }

    fn insert_category(&self, mut category: Category) -> Result<Category> {
        let mut t = self.lock()?;
        category.id = t.next_id();
        t.categories.insert(category.id, category.clone());
        Ok(category)
    }

    fn category(&self, id: Id) -> Result<Option<Category>> {
        Ok(self.lock()?.categories.get(&id).cloned())
    }

    fn categories_for_user(&self, user_id: Id) -> Result<Vec<Category>> {
        Ok(owned_by(&self.lock()?.categories, |c| c.user_id == user_id))
    }

    fn insert_statement(&self, mut statement: BankStatement) -> Result<BankStatement> {
        let mut t = self.lock()?;
        statement.id = t.next_id();
        t.statements.insert(statement.id, statement.clone());
        Ok(statement)
    }

    fn statement(&self, id: Id) -> Result<Option<BankStatement>> {
        Ok(self.lock()?.statements.get(&id).cloned())
    }

    fn statements_for_user(&self, user_id: Id) -> Result<Vec<BankStatement>> {
        Ok(owned_by(&self.lock()?.statements, |s| s.user_id == user_id))
    }

    fn statement_by_checksum(&self, account_id: Id, checksum: &str) -> Result<Option<BankStatement>> {
        Ok(self
            .lock()?
            .statements
            .values()
            .find(|s| {
                s.account_id == account_id
                    && s.checksum.as_deref() == Some(checksum)
                    && (s.processed || s.processing_error.is_none())
            })
            .cloned())
    }

    fn mark_statement_processed(
        &self,
        id: Id,
        transaction_count: i64,
        balance_verified: bool,
    ) -> Result<()> {
        let mut t = self.lock()?;
        let statement = t
            .statements
            .get_mut(&id)
            .ok_or_else(|| RentbookError::not_found("bank statement", id))?;
        if statement.processed {
            return Err(RentbookError::Conflict(format!("statement {id} is already processed")));
        }
        statement.processed = true;
        statement.transaction_count = transaction_count;
        statement.balance_verified = balance_verified;
        statement.processing_error = None;
        statement.reconciled = balance_verified && transaction_count == 0;
        Ok(())
    }

    fn insert_bank_transactions(&self, rows: Vec<BankTransaction>) -> Result<Vec<BankTransaction>> {
        let mut t = self.lock()?;
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.id = t.next_id();
            t.bank_transactions.insert(row.id, row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    fn bank_transaction(&self, id: Id) -> Result<Option<BankTransaction>> {
        Ok(self.lock()?.bank_transactions.get(&id).cloned())
    }

    fn bank_transactions_for_statement(&self, statement_id: Id) -> Result<Vec<BankTransaction>> {
        let mut rows = owned_by(&self.lock()?.bank_transactions, |b| b.statement_id == statement_id);
        rows.sort_by(|a, b| a.transaction_date.cmp(&b.transaction_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn commit_classification(&self, commit: &ClassificationCommit) -> Result<Option<LedgerEntry>> {
        let mut t = self.lock()?;
        let txn = &commit.transaction;

        // Validate everything before touching anything.
        if !t.bank_transactions.contains_key(&txn.id) {
            return Err(RentbookError::not_found("bank transaction", txn.id));
        }
        if !t.statements.contains_key(&txn.statement_id) {
            return Err(RentbookError::not_found("bank statement", txn.statement_id));
        }
        if let Some(payment) = &commit.payment {
            match t.payments.get(&payment.id) {
                None => return Err(RentbookError::not_found("payment", payment.id)),
                Some(stored) if stored.is_received() && payment.is_received() => {
                    return Err(RentbookError::Conflict(received_message(payment.id)))
                }
                Some(_) => {}
            }
        }
        if let Some(entry) = &commit.ledger_entry {
            let already_posted = entry.bank_transaction_id.is_some()
                && t.ledger
                    .values()
                    .any(|e| e.bank_transaction_id == entry.bank_transaction_id);
            if already_posted {
                return Err(RentbookError::Conflict(format!(
                    "bank transaction {} is already posted to the ledger",
                    txn.id
                )));
            }
        }

        t.bank_transactions.insert(txn.id, txn.clone());
        if let Some(payment) = &commit.payment {
            t.payments.insert(payment.id, payment.clone());
        }
        if let Some(statement) = t.statements.get_mut(&txn.statement_id) {
            statement.reconciled = commit.statement_reconciled;
        }
        let posted = match &commit.ledger_entry {
            Some(entry) => {
                let mut entry = entry.clone();
                entry.id = t.next_id();
                t.ledger.insert(entry.id, entry.clone());
                Some(entry)
            }
            None => None,
        };
        Ok(posted)
    }

    fn insert_ledger_entry(&self, mut entry: LedgerEntry) -> Result<LedgerEntry> {
        let mut t = self.lock()?;
        entry.id = t.next_id();
        t.ledger.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn ledger_entries(&self, user_id: Id, window: DateWindow) -> Result<Vec<LedgerEntry>> {
        let mut rows = owned_by(&self.lock()?.ledger, |e| {
            e.user_id == user_id && window.contains(e.date)
        });
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn insert_budget(&self, mut budget: Budget) -> Result<Budget> {
        let mut t = self.lock()?;
        budget.id = t.next_id();
        t.budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    fn budgets_for_user(&self, user_id: Id) -> Result<Vec<Budget>> {
        Ok(owned_by(&self.lock()?.budgets, |b| b.user_id == user_id))
    }

    fn insert_tax_year(&self, mut tax_year: TaxYear) -> Result<TaxYear> {
        let mut t = self.lock()?;
        tax_year.id = t.next_id();
        t.tax_years.insert(tax_year.id, tax_year.clone());
        Ok(tax_year)
    }

    fn tax_year(&self, id: Id) -> Result<Option<TaxYear>> {
        Ok(self.lock()?.tax_years.get(&id).cloned())
    }

    fn tax_years_for_user(&self, user_id: Id) -> Result<Vec<TaxYear>> {
        Ok(owned_by(&self.lock()?.tax_years, |y| y.user_id == user_id))
    }

    fn close_tax_year(&self, tax_year: &TaxYear) -> Result<()> {
        let mut t = self.lock()?;
        let slot = t
            .tax_years
            .get_mut(&tax_year.id)
            .ok_or_else(|| RentbookError::not_found("tax year", tax_year.id))?;
        if slot.is_closed {
            return Err(RentbookError::Conflict(format!("tax year {} is already closed", slot.label)));
        }
        *slot = tax_year.clone();
        slot.is_closed = true;
        Ok(())
    }

    fn insert_reminder(&self, mut reminder: PaymentReminder) -> Result<PaymentReminder> {
        let mut t = self.lock()?;
        reminder.id = 0;
        if t.has_pending_twin(&reminder) {
            return Err(RentbookError::Conflict(duplicate_pending_message(&reminder)));
        }
        reminder.id = t.next_id();
        t.reminders.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    fn reminder(&self, id: Id) -> Result<Option<PaymentReminder>> {
        Ok(self.lock()?.reminders.get(&id).cloned())
    }

    fn reminders_for_payment(&self, payment_id: Id) -> Result<Vec<PaymentReminder>> {
        Ok(owned_by(&self.lock()?.reminders, |r| r.payment_id == payment_id))
    }

    fn reminders_for_user(&self, user_id: Id) -> Result<Vec<PaymentReminder>> {
        Ok(owned_by(&self.lock()?.reminders, |r| r.user_id == user_id))
    }

    fn update_reminder(&self, reminder: &PaymentReminder) -> Result<()> {
        let mut t = self.lock()?;
        if t.has_pending_twin(reminder) {
            return Err(RentbookError::Conflict(duplicate_pending_message(reminder)));
        }
        replace(&mut t.reminders, reminder.id, reminder, "payment reminder")
    }
}

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, Row};

use crate::db::{get_connection, init_db};
use crate::error::{RentbookError, Result};
use crate::models::{
    BankAccount, BankStatement, BankTransaction, Budget, BudgetPeriod, Category, DateWindow,
    DeliveryChannel, EntryType, Id, LedgerEntry, Payment, PaymentReminder, PaymentStatus, Property,
    ReminderStatus, ReminderType, TaxYear, Tenant, TransactionStatus,
};

use super::{duplicate_pending_message, received_message, ClassificationCommit, Store};

// ---------------------------------------------------------------------------
// Text columns for the string-backed enums
// ---------------------------------------------------------------------------

macro_rules! text_column {
    ($($name:ty),+ $(,)?) => {
        $(
            impl ToSql for $name {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $name {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: String| FromSqlError::Other(e.into()))
                }
            }
        )+
    };
}

text_column!(
    PaymentStatus,
    TransactionStatus,
    EntryType,
    ReminderType,
    ReminderStatus,
    DeliveryChannel,
    BudgetPeriod,
);

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const PROPERTY_COLS: &str = "id, user_id, name, address_line1, address_line2, city, state, \
    postal_code, purchase_date, purchase_price, current_value";

fn property_from_row(row: &Row) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        address_line1: row.get(3)?,
        address_line2: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        postal_code: row.get(7)?,
        purchase_date: row.get(8)?,
        purchase_price: row.get(9)?,
        current_value: row.get(10)?,
    })
}

const TENANT_COLS: &str = "id, user_id, property_id, first_name, last_name, email, phone, \
    lease_start, lease_end, rent_amount, rent_due_day, active";

fn tenant_from_row(row: &Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        property_id: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        lease_start: row.get(7)?,
        lease_end: row.get(8)?,
        rent_amount: row.get(9)?,
        rent_due_day: row.get(10)?,
        active: row.get(11)?,
    })
}

const PAYMENT_COLS: &str =
    "id, user_id, tenant_id, property_id, amount, due_date, date_paid, status, transaction_id, notes";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tenant_id: row.get(2)?,
        property_id: row.get(3)?,
        amount: row.get(4)?,
        due_date: row.get(5)?,
        date_paid: row.get(6)?,
        status: row.get(7)?,
        transaction_id: row.get(8)?,
        notes: row.get(9)?,
    })
}

const ACCOUNT_COLS: &str = "id, user_id, name, balance, currency, is_default";

fn account_from_row(row: &Row) -> rusqlite::Result<BankAccount> {
    Ok(BankAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        balance: row.get(3)?,
        currency: row.get(4)?,
        is_default: row.get(5)?,
    })
}

const CATEGORY_COLS: &str = "id, user_id, name, category_type, is_default";

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        category_type: row.get(3)?,
        is_default: row.get(4)?,
    })
}

const STATEMENT_COLS: &str = "id, user_id, account_id, start_date, end_date, starting_balance, \
    ending_balance, transaction_count, processed, reconciled, balance_verified, processing_error, \
    checksum, source_name, uploaded_at";

fn statement_from_row(row: &Row) -> rusqlite::Result<BankStatement> {
    Ok(BankStatement {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        starting_balance: row.get(5)?,
        ending_balance: row.get(6)?,
        transaction_count: row.get(7)?,
        processed: row.get(8)?,
        reconciled: row.get(9)?,
        balance_verified: row.get(10)?,
        processing_error: row.get(11)?,
        checksum: row.get(12)?,
        source_name: row.get(13)?,
        uploaded_at: row.get(14)?,
    })
}

const BANK_TXN_COLS: &str = "id, statement_id, account_id, transaction_date, description, amount, \
    is_deposit, balance, reference, counterparty, status, category_id, tenant_id, payment_id, \
    property_id, reconciled, review_reason";

fn bank_txn_from_row(row: &Row) -> rusqlite::Result<BankTransaction> {
    Ok(BankTransaction {
        id: row.get(0)?,
        statement_id: row.get(1)?,
        account_id: row.get(2)?,
        transaction_date: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        is_deposit: row.get(6)?,
        balance: row.get(7)?,
        reference: row.get(8)?,
        counterparty: row.get(9)?,
        status: row.get(10)?,
        category_id: row.get(11)?,
        tenant_id: row.get(12)?,
        payment_id: row.get(13)?,
        property_id: row.get(14)?,
        reconciled: row.get(15)?,
        review_reason: row.get(16)?,
    })
}

const LEDGER_COLS: &str =
    "id, user_id, date, description, amount, entry_type, category_id, property_id, bank_transaction_id";

fn ledger_from_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        entry_type: row.get(5)?,
        category_id: row.get(6)?,
        property_id: row.get(7)?,
        bank_transaction_id: row.get(8)?,
    })
}

const BUDGET_COLS: &str = "id, user_id, category_id, name, amount, period, start_date, end_date";

fn budget_from_row(row: &Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        name: row.get(3)?,
        amount: row.get(4)?,
        period: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
    })
}

const TAX_YEAR_COLS: &str = "id, user_id, label, start_date, end_date, total_income, \
    total_expenses, net_income, tax_rate, estimated_tax, is_closed, closed_at";

fn tax_year_from_row(row: &Row) -> rusqlite::Result<TaxYear> {
    Ok(TaxYear {
        id: row.get(0)?,
        user_id: row.get(1)?,
        label: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        total_income: row.get(5)?,
        total_expenses: row.get(6)?,
        net_income: row.get(7)?,
        tax_rate: row.get(8)?,
        estimated_tax: row.get(9)?,
        is_closed: row.get(10)?,
        closed_at: row.get(11)?,
    })
}

const REMINDER_COLS: &str = "id, user_id, payment_id, tenant_id, reminder_type, reminder_status, \
    scheduled_date, sent_date, subject, message, channel, response_received, response_date, \
    response_message, failure_reason, attempts";

fn reminder_from_row(row: &Row) -> rusqlite::Result<PaymentReminder> {
    Ok(PaymentReminder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        payment_id: row.get(2)?,
        tenant_id: row.get(3)?,
        reminder_type: row.get(4)?,
        status: row.get(5)?,
        scheduled_date: row.get(6)?,
        sent_date: row.get(7)?,
        subject: row.get(8)?,
        message: row.get(9)?,
        channel: row.get(10)?,
        response_received: row.get(11)?,
        response_date: row.get(12)?,
        response_message: row.get(13)?,
        failure_reason: row.get(14)?,
        attempts: row.get(15)?,
    })
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_one<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, map).optional()?)
}

fn ensure_updated(changed: usize, entity: &'static str, id: Id) -> Result<()> {
    if changed == 0 {
        Err(RentbookError::not_found(entity, id))
    } else {
        Ok(())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn write_payment(conn: &Connection, p: &Payment) -> Result<()> {
    let changed = conn.execute(
        "UPDATE payments SET tenant_id = ?1, property_id = ?2, amount = ?3, due_date = ?4, \
         date_paid = ?5, status = ?6, transaction_id = ?7, notes = ?8 WHERE id = ?9",
        params![
            p.tenant_id,
            p.property_id,
            p.amount,
            p.due_date,
            p.date_paid,
            p.status,
            p.transaction_id,
            p.notes,
            p.id
        ],
    )?;
    ensure_updated(changed, "payment", p.id)
}

fn write_ledger_entry(conn: &Connection, mut e: LedgerEntry) -> Result<LedgerEntry> {
    conn.execute(
        "INSERT INTO ledger_entries (user_id, date, description, amount, entry_type, category_id, \
         property_id, bank_transaction_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            e.user_id,
            e.date,
            e.description,
            e.amount,
            e.entry_type,
            e.category_id,
            e.property_id,
            e.bank_transaction_id
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            RentbookError::Conflict(format!(
                "bank transaction {:?} is already posted to the ledger",
                e.bank_transaction_id
            ))
        } else {
            err.into()
        }
    })?;
    e.id = conn.last_insert_rowid();
    Ok(e)
}

fn pending_twin_exists(conn: &Connection, r: &PaymentReminder) -> Result<bool> {
    if r.status != ReminderStatus::Pending {
        return Ok(false);
    }
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM payment_reminders WHERE payment_id = ?1 AND reminder_type = ?2 \
         AND reminder_status = 'pending' AND id != ?3",
    )?;
    Ok(stmt.exists(params![r.payment_id, r.reminder_type, r.id])?)
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite backend. The connection sits behind a mutex so the store can be shared.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RentbookError::Other("sqlite connection lock poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    fn insert_property(&self, mut p: Property) -> Result<Property> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO properties (user_id, name, address_line1, address_line2, city, state, \
             postal_code, purchase_date, purchase_price, current_value) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                p.user_id,
                p.name,
                p.address_line1,
                p.address_line2,
                p.city,
                p.state,
                p.postal_code,
                p.purchase_date,
                p.purchase_price,
                p.current_value
            ],
        )?;
        p.id = conn.last_insert_rowid();
        Ok(p)
    }

    fn property(&self, id: Id) -> Result<Option<Property>> {
        let sql = format!("SELECT {PROPERTY_COLS} FROM properties WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], property_from_row)
    }

    fn insert_tenant(&self, mut t: Tenant) -> Result<Tenant> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenants (user_id, property_id, first_name, last_name, email, phone, \
             lease_start, lease_end, rent_amount, rent_due_day, active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                t.user_id,
                t.property_id,
                t.first_name,
                t.last_name,
                t.email,
                t.phone,
                t.lease_start,
                t.lease_end,
                t.rent_amount,
                t.rent_due_day,
                t.active
            ],
        )?;
        t.id = conn.last_insert_rowid();
        Ok(t)
    }

    fn tenant(&self, id: Id) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {TENANT_COLS} FROM tenants WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], tenant_from_row)
    }

    fn tenants_for_user(&self, user_id: Id) -> Result<Vec<Tenant>> {
        let sql = format!("SELECT {TENANT_COLS} FROM tenants WHERE user_id = ?1 ORDER BY id");
        query_all(&*self.lock()?, &sql, [user_id], tenant_from_row)
    }

    fn update_tenant(&self, t: &Tenant) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE tenants SET property_id = ?1, first_name = ?2, last_name = ?3, email = ?4, \
             phone = ?5, lease_start = ?6, lease_end = ?7, rent_amount = ?8, rent_due_day = ?9, \
             active = ?10 WHERE id = ?11",
            params![
                t.property_id,
                t.first_name,
                t.last_name,
                t.email,
                t.phone,
                t.lease_start,
                t.lease_end,
                t.rent_amount,
                t.rent_due_day,
                t.active,
                t.id
            ],
        )?;
        ensure_updated(changed, "tenant", t.id)
    }

    fn insert_payment(&self, mut p: Payment) -> Result<Payment> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO payments (user_id, tenant_id, property_id, amount, due_date, date_paid, \
             status, transaction_id, notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                p.user_id,
                p.tenant_id,
                p.property_id,
                p.amount,
                p.due_date,
                p.date_paid,
                p.status,
                p.transaction_id,
                p.notes
            ],
        )?;
        p.id = conn.last_insert_rowid();
        Ok(p)
    }

    fn payment(&self, id: Id) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], payment_from_row)
    }

    fn payments_for_tenant(&self, tenant_id: Id) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE tenant_id = ?1 ORDER BY due_date DESC, id DESC"
        );
        query_all(&*self.lock()?, &sql, [tenant_id], payment_from_row)
    }

    fn payments_for_user(&self, user_id: Id) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE user_id = ?1 ORDER BY due_date, id"
        );
        query_all(&*self.lock()?, &sql, [user_id], payment_from_row)
    }

    fn update_payment(&self, payment: &Payment) -> Result<()> {
        write_payment(&*self.lock()?, payment)
    }

    fn insert_account(&self, mut a: BankAccount) -> Result<BankAccount> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bank_accounts (user_id, name, balance, currency, is_default) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![a.user_id, a.name, a.balance, a.currency, a.is_default],
        )?;
        a.id = conn.last_insert_rowid();
        Ok(a)
    }

    fn account(&self, id: Id) -> Result<Option<BankAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLS} FROM bank_accounts WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], account_from_row)
    }

    fn accounts_for_user(&self, user_id: Id) -> Result<Vec<BankAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLS} FROM bank_accounts WHERE user_id = ?1 ORDER BY id");
        query_all(&*self.lock()?, &sql, [user_id], account_from_row)
    }

    fn update_account(&self, a: &BankAccount) -> Result<()> {
        let changed = self.lock()?.execute(
            "UPDATE bank_accounts SET name = ?1, balance = ?2, currency = ?3, is_default = ?4 \
             WHERE id = ?5",
            params![a.name, a.balance, a.currency, a.is_default, a.id],
        )?;
        ensure_updated(changed, "bank account", a.id)
    }

    fn insert_category(&self, mut c: Category) -> Result<Category> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO categories (user_id, name, category_type, is_default) VALUES (?1, ?2, ?3, ?4)",
            params![c.user_id, c.name, c.category_type, c.is_default],
        )?;
        c.id = conn.last_insert_rowid();
        Ok(c)
    }

    fn category(&self, id: Id) -> Result<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLS} FROM categories WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], category_from_row)
    }

    fn categories_for_user(&self, user_id: Id) -> Result<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLS} FROM categories WHERE user_id = ?1 ORDER BY id");
        query_all(&*self.lock()?, &sql, [user_id], category_from_row)
    }

    fn insert_statement(&self, mut s: BankStatement) -> Result<BankStatement> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bank_statements (user_id, account_id, start_date, end_date, \
             starting_balance, ending_balance, transaction_count, processed, reconciled, \
             balance_verified, processing_error, checksum, source_name, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                s.user_id,
                s.account_id,
                s.start_date,
                s.end_date,
                s.starting_balance,
                s.ending_balance,
                s.transaction_count,
                s.processed,
                s.reconciled,
                s.balance_verified,
                s.processing_error,
                s.checksum,
                s.source_name,
                s.uploaded_at
            ],
        )?;
        s.id = conn.last_insert_rowid();
        Ok(s)
    }

    fn statement(&self, id: Id) -> Result<Option<BankStatement>> {
        let sql = format!("SELECT {STATEMENT_COLS} FROM bank_statements WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], statement_from_row)
    }

    fn statements_for_user(&self, user_id: Id) -> Result<Vec<BankStatement>> {
        let sql = format!(
            "SELECT {STATEMENT_COLS} FROM bank_statements WHERE user_id = ?1 ORDER BY id"
        );
        query_all(&*self.lock()?, &sql, [user_id], statement_from_row)
    }

    fn statement_by_checksum(&self, account_id: Id, checksum: &str) -> Result<Option<BankStatement>> {
        let sql = format!(
            "SELECT {STATEMENT_COLS} FROM bank_statements WHERE account_id = ?1 AND checksum = ?2 \
             AND (processed = 1 OR processing_error IS NULL) LIMIT 1"
        );
        query_one(&*self.lock()?, &sql, params![account_id, checksum], statement_from_row)
    }

    fn mark_statement_processed(
        &self,
        id: Id,
        transaction_count: i64,
        balance_verified: bool,
    ) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE bank_statements SET processed = 1, transaction_count = ?1, \
             balance_verified = ?2, processing_error = NULL, reconciled = ?3 \
             WHERE id = ?4 AND processed = 0",
            params![
                transaction_count,
                balance_verified,
                balance_verified && transaction_count == 0,
                id
            ],
        )?;
        if changed == 1 {
            return Ok(());
        }
        let exists = conn
            .prepare_cached("SELECT 1 FROM bank_statements WHERE id = ?1")?
            .exists([id])?;
        if exists {
            Err(RentbookError::Conflict(format!("statement {id} is already processed")))
        } else {
            Err(RentbookError::not_found("bank statement", id))
        }
    }

    fn insert_bank_transactions(&self, rows: Vec<BankTransaction>) -> Result<Vec<BankTransaction>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO bank_transactions (statement_id, account_id, transaction_date, \
                 description, amount, is_deposit, balance, reference, counterparty, status, \
                 category_id, tenant_id, payment_id, property_id, reconciled, review_reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for mut b in rows {
                stmt.execute(params![
                    b.statement_id,
                    b.account_id,
                    b.transaction_date,
                    b.description,
                    b.amount,
                    b.is_deposit,
                    b.balance,
                    b.reference,
                    b.counterparty,
                    b.status,
                    b.category_id,
                    b.tenant_id,
                    b.payment_id,
                    b.property_id,
                    b.reconciled,
                    b.review_reason
                ])?;
                b.id = tx.last_insert_rowid();
                stored.push(b);
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    fn bank_transaction(&self, id: Id) -> Result<Option<BankTransaction>> {
        let sql = format!("SELECT {BANK_TXN_COLS} FROM bank_transactions WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], bank_txn_from_row)
    }

    fn bank_transactions_for_statement(&self, statement_id: Id) -> Result<Vec<BankTransaction>> {
        let sql = format!(
            "SELECT {BANK_TXN_COLS} FROM bank_transactions WHERE statement_id = ?1 \
             ORDER BY transaction_date, id"
        );
        query_all(&*self.lock()?, &sql, [statement_id], bank_txn_from_row)
    }

    fn commit_classification(&self, commit: &ClassificationCommit) -> Result<Option<LedgerEntry>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let b = &commit.transaction;

        let changed = tx.execute(
            "UPDATE bank_transactions SET status = ?1, category_id = ?2, tenant_id = ?3, \
             payment_id = ?4, property_id = ?5, reconciled = ?6, review_reason = ?7 WHERE id = ?8",
            params![
                b.status,
                b.category_id,
                b.tenant_id,
                b.payment_id,
                b.property_id,
                b.reconciled,
                b.review_reason,
                b.id
            ],
        )?;
        ensure_updated(changed, "bank transaction", b.id)?;

        if let Some(payment) = &commit.payment {
            if payment.is_received() {
                let changed = tx.execute(
                    "UPDATE payments SET status = ?1 WHERE id = ?2 AND status != ?1",
                    params![PaymentStatus::Received, payment.id],
                )?;
                if changed == 0 {
                    let exists = tx
                        .prepare_cached("SELECT 1 FROM payments WHERE id = ?1")?
                        .exists([payment.id])?;
                    return Err(if exists {
                        RentbookError::Conflict(received_message(payment.id))
                    } else {
                        RentbookError::not_found("payment", payment.id)
                    });
                }
            }
            write_payment(&tx, payment)?;
        }
        let posted = match &commit.ledger_entry {
            Some(entry) => Some(write_ledger_entry(&tx, entry.clone())?),
            None => None,
        };
        let changed = tx.execute(
            "UPDATE bank_statements SET reconciled = ?1 WHERE id = ?2",
            params![commit.statement_reconciled, b.statement_id],
        )?;
        ensure_updated(changed, "bank statement", b.statement_id)?;

        tx.commit()?;
        Ok(posted)
    }

    fn insert_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        write_ledger_entry(&*self.lock()?, entry)
    }

    fn ledger_entries(&self, user_id: Id, window: DateWindow) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {LEDGER_COLS} FROM ledger_entries WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3 \
             ORDER BY date, id"
        );
        query_all(
            &*self.lock()?,
            &sql,
            params![user_id, window.start, window.end],
            ledger_from_row,
        )
    }

    fn insert_budget(&self, mut b: Budget) -> Result<Budget> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO budgets (user_id, category_id, name, amount, period, start_date, end_date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![b.user_id, b.category_id, b.name, b.amount, b.period, b.start_date, b.end_date],
        )?;
        b.id = conn.last_insert_rowid();
        Ok(b)
    }

    fn budgets_for_user(&self, user_id: Id) -> Result<Vec<Budget>> {
        let sql = format!("SELECT {BUDGET_COLS} FROM budgets WHERE user_id = ?1 ORDER BY id");
        query_all(&*self.lock()?, &sql, [user_id], budget_from_row)
    }

    fn insert_tax_year(&self, mut y: TaxYear) -> Result<TaxYear> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tax_years (user_id, label, start_date, end_date, total_income, \
             total_expenses, net_income, tax_rate, estimated_tax, is_closed, closed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                y.user_id,
                y.label,
                y.start_date,
                y.end_date,
                y.total_income,
                y.total_expenses,
                y.net_income,
                y.tax_rate,
                y.estimated_tax,
                y.is_closed,
                y.closed_at
            ],
        )?;
        y.id = conn.last_insert_rowid();
        Ok(y)
    }

    fn tax_year(&self, id: Id) -> Result<Option<TaxYear>> {
        let sql = format!("SELECT {TAX_YEAR_COLS} FROM tax_years WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], tax_year_from_row)
    }

    fn tax_years_for_user(&self, user_id: Id) -> Result<Vec<TaxYear>> {
        let sql = format!("SELECT {TAX_YEAR_COLS} FROM tax_years WHERE user_id = ?1 ORDER BY id");
        query_all(&*self.lock()?, &sql, [user_id], tax_year_from_row)
    }

    fn close_tax_year(&self, y: &TaxYear) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tax_years SET total_income = ?1, total_expenses = ?2, net_income = ?3, \
             tax_rate = ?4, estimated_tax = ?5, is_closed = 1, closed_at = ?6 \
             WHERE id = ?7 AND is_closed = 0",
            params![
                y.total_income,
                y.total_expenses,
                y.net_income,
                y.tax_rate,
                y.estimated_tax,
                y.closed_at,
                y.id
            ],
        )?;
        if changed == 1 {
            return Ok(());
        }
        let exists = conn.prepare_cached("SELECT 1 FROM tax_years WHERE id = ?1")?.exists([y.id])?;
        if exists {
            Err(RentbookError::Conflict(format!("tax year {} is already closed", y.label)))
        } else {
            Err(RentbookError::not_found("tax year", y.id))
        }
    }

    fn insert_reminder(&self, mut r: PaymentReminder) -> Result<PaymentReminder> {
        let conn = self.lock()?;
        r.id = 0;
        if pending_twin_exists(&conn, &r)? {
            return Err(RentbookError::Conflict(duplicate_pending_message(&r)));
        }
        conn.execute(
            "INSERT INTO payment_reminders (user_id, payment_id, tenant_id, reminder_type, \
             reminder_status, scheduled_date, sent_date, subject, message, channel, \
             response_received, response_date, response_message, failure_reason, attempts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                r.user_id,
                r.payment_id,
                r.tenant_id,
                r.reminder_type,
                r.status,
                r.scheduled_date,
                r.sent_date,
                r.subject,
                r.message,
                r.channel,
                r.response_received,
                r.response_date,
                r.response_message,
                r.failure_reason,
                r.attempts
            ],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                RentbookError::Conflict(duplicate_pending_message(&r))
            } else {
                err.into()
            }
        })?;
        r.id = conn.last_insert_rowid();
        Ok(r)
    }

    fn reminder(&self, id: Id) -> Result<Option<PaymentReminder>> {
        let sql = format!("SELECT {REMINDER_COLS} FROM payment_reminders WHERE id = ?1");
        query_one(&*self.lock()?, &sql, [id], reminder_from_row)
    }

    fn reminders_for_payment(&self, payment_id: Id) -> Result<Vec<PaymentReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLS} FROM payment_reminders WHERE payment_id = ?1 ORDER BY id"
        );
        query_all(&*self.lock()?, &sql, [payment_id], reminder_from_row)
    }

    fn reminders_for_user(&self, user_id: Id) -> Result<Vec<PaymentReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLS} FROM payment_reminders WHERE user_id = ?1 ORDER BY id"
        );
        query_all(&*self.lock()?, &sql, [user_id], reminder_from_row)
    }

    fn update_reminder(&self, r: &PaymentReminder) -> Result<()> {
        let conn = self.lock()?;
        if pending_twin_exists(&conn, r)? {
            return Err(RentbookError::Conflict(duplicate_pending_message(r)));
        }
        let changed = conn.execute(
            "UPDATE payment_reminders SET reminder_type = ?1, reminder_status = ?2, \
             scheduled_date = ?3, sent_date = ?4, subject = ?5, message = ?6, channel = ?7, \
             response_received = ?8, response_date = ?9, response_message = ?10, \
             failure_reason = ?11, attempts = ?12 WHERE id = ?13",
            params![
                r.reminder_type,
                r.status,
                r.scheduled_date,
                r.sent_date,
                r.subject,
                r.message,
                r.channel,
                r.response_received,
                r.response_date,
                r.response_message,
                r.failure_reason,
                r.attempts,
                r.id
            ],
        )?;
        ensure_updated(changed, "payment reminder", r.id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_enum_columns_are_stored_as_text() {
        let (_dir, store) = test_store();
        let c = store
            .insert_category(Category {
                id: 0,
                user_id: 3,
                name: "Utilities".into(),
                category_type: EntryType::Expense,
                is_default: true,
            })
            .unwrap();
        let raw: String = store
            .lock()
            .unwrap()
            .query_row("SELECT category_type FROM categories WHERE id = ?1", [c.id], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, "expense");
        assert_eq!(store.category(c.id).unwrap().unwrap(), c);
    }

    #[test]
    fn test_unknown_enum_text_is_a_conversion_error() {
        let (_dir, store) = test_store();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO categories (user_id, name, category_type) VALUES (1, 'Odd', 'sideways')",
                [],
            )
            .unwrap();
        assert!(store.categories_for_user(1).is_err());
    }

    #[test]
    fn test_dates_round_trip() {
        let (_dir, store) = test_store();
        let property = store
            .insert_property(Property {
                id: 0,
                user_id: 1,
                name: "Elm Duplex".into(),
                address_line1: "12 Elm St".into(),
                address_line2: None,
                city: "Dayton".into(),
                state: "OH".into(),
                postal_code: "45402".into(),
                purchase_date: NaiveDate::from_ymd_opt(2019, 6, 14),
                purchase_price: Some(182_000.0),
                current_value: None,
            })
            .unwrap();
        let loaded = store.property(property.id).unwrap().unwrap();
        assert_eq!(loaded.purchase_date, NaiveDate::from_ymd_opt(2019, 6, 14));
        assert_eq!(loaded, property);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .update_account(&BankAccount {
                id: 99,
                user_id: 1,
                name: "Ghost".into(),
                balance: 0.0,
                currency: "USD".into(),
                is_default: false,
            })
            .unwrap_err();
        assert!(matches!(err, RentbookError::NotFound { entity: "bank account", id: 99 }));
    }
}

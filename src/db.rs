use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::EntryType;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS properties (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    address_line1 TEXT NOT NULL,
    address_line2 TEXT,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    purchase_date TEXT,
    purchase_price REAL,
    current_value REAL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    property_id INTEGER,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    lease_start TEXT,
    lease_end TEXT,
    rent_amount REAL NOT NULL,
    rent_due_day INTEGER NOT NULL DEFAULT 1,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (property_id) REFERENCES properties(id)
);

CREATE TABLE IF NOT EXISTS bank_accounts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    balance REAL NOT NULL DEFAULT 0,
    currency TEXT NOT NULL DEFAULT 'USD',
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS bank_statements (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    starting_balance REAL NOT NULL,
    ending_balance REAL NOT NULL,
    transaction_count INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    reconciled INTEGER NOT NULL DEFAULT 0,
    balance_verified INTEGER NOT NULL DEFAULT 0,
    processing_error TEXT,
    checksum TEXT,
    source_name TEXT,
    uploaded_at TEXT NOT NULL,
    FOREIGN KEY (account_id) REFERENCES bank_accounts(id)
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    category_type TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL,
    property_id INTEGER,
    amount REAL NOT NULL,
    due_date TEXT NOT NULL,
    date_paid TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    transaction_id INTEGER,
    notes TEXT,
    FOREIGN KEY (tenant_id) REFERENCES tenants(id)
);

CREATE TABLE IF NOT EXISTS bank_transactions (
    id INTEGER PRIMARY KEY,
    statement_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    transaction_date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL,
    is_deposit INTEGER NOT NULL,
    balance REAL,
    reference TEXT,
    counterparty TEXT,
    status TEXT NOT NULL DEFAULT 'unprocessed',
    category_id INTEGER,
    tenant_id INTEGER,
    payment_id INTEGER,
    property_id INTEGER,
    reconciled INTEGER NOT NULL DEFAULT 0,
    review_reason TEXT,
    FOREIGN KEY (statement_id) REFERENCES bank_statements(id),
    FOREIGN KEY (account_id) REFERENCES bank_accounts(id),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (payment_id) REFERENCES payments(id)
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL,
    entry_type TEXT NOT NULL,
    category_id INTEGER,
    property_id INTEGER,
    bank_transaction_id INTEGER UNIQUE,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (bank_transaction_id) REFERENCES bank_transactions(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    period TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS tax_years (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    label INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    total_income REAL NOT NULL DEFAULT 0,
    total_expenses REAL NOT NULL DEFAULT 0,
    net_income REAL NOT NULL DEFAULT 0,
    tax_rate REAL,
    estimated_tax REAL,
    is_closed INTEGER NOT NULL DEFAULT 0,
    closed_at TEXT
);

CREATE TABLE IF NOT EXISTS payment_reminders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    payment_id INTEGER NOT NULL,
    tenant_id INTEGER NOT NULL,
    reminder_type TEXT NOT NULL,
    reminder_status TEXT NOT NULL DEFAULT 'pending',
    scheduled_date TEXT NOT NULL,
    sent_date TEXT,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    channel TEXT NOT NULL,
    response_received INTEGER NOT NULL DEFAULT 0,
    response_date TEXT,
    response_message TEXT,
    failure_reason TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (payment_id) REFERENCES payments(id),
    FOREIGN KEY (tenant_id) REFERENCES tenants(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_one_pending_reminder
    ON payment_reminders(payment_id, reminder_type)
    WHERE reminder_status = 'pending';

CREATE INDEX IF NOT EXISTS idx_payments_tenant_due ON payments(tenant_id, due_date);
CREATE INDEX IF NOT EXISTS idx_bank_transactions_statement ON bank_transactions(statement_id);
CREATE INDEX IF NOT EXISTS idx_ledger_entries_user_date ON ledger_entries(user_id, date);
";

pub const RENT_INCOME: &str = "Rent Income";

/// Categories every user starts with: (name, type).
pub const DEFAULT_CATEGORIES: &[(&str, EntryType)] = &[
    (RENT_INCOME, EntryType::Income),
    ("Other Income", EntryType::Income),
    ("Maintenance", EntryType::Expense),
    ("Utilities", EntryType::Expense),
    ("Insurance", EntryType::Expense),
    ("Property Tax", EntryType::Expense),
    ("Mortgage", EntryType::Expense),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "properties",
            "tenants",
            "bank_accounts",
            "bank_statements",
            "bank_transactions",
            "categories",
            "payments",
            "ledger_entries",
            "budgets",
            "tax_years",
            "payment_reminders",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_pending_reminder_index_rejects_duplicates() {
        let (_dir, conn) = test_db();
        conn.execute_batch("PRAGMA foreign_keys=OFF;").unwrap();
        let insert = "INSERT INTO payment_reminders \
            (user_id, payment_id, tenant_id, reminder_type, reminder_status, scheduled_date, subject, message, channel) \
            VALUES (1, 1, 1, 'due', ?1, '2024-03-01', 's', 'm', 'email')";
        conn.execute(insert, ["pending"]).unwrap();
        conn.execute(insert, ["sent"]).unwrap();
        assert!(conn.execute(insert, ["pending"]).is_err());
    }

    #[test]
    fn test_default_categories_cover_both_types() {
        let income = DEFAULT_CATEGORIES.iter().filter(|(_, t)| *t == EntryType::Income).count();
        let expense = DEFAULT_CATEGORIES.iter().filter(|(_, t)| *t == EntryType::Expense).count();
        assert!(income >= 1 && expense >= 5);
        assert!(DEFAULT_CATEGORIES.iter().any(|(n, _)| *n == RENT_INCOME));
    }
}

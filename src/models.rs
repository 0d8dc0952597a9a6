use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type Id = i64;

/// Declares a string-backed enum with `as_str`, `Display` and `FromStr`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} value: {other}", stringify!($name))),
                }
            }
        }
    };
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Received => "received",
    Late => "late",
    Overdue => "overdue",
    PartiallyPaid => "partially_paid",
    Waived => "waived",
});

text_enum!(TransactionStatus {
    Unprocessed => "unprocessed",
    Processed => "processed",
    Matched => "matched",
    Ignored => "ignored",
    NeedsReview => "needs_review",
});

text_enum!(
    /// Direction of a category or ledger entry.
    EntryType {
        Income => "income",
        Expense => "expense",
    }
);

text_enum!(ReminderType {
    Upcoming => "upcoming",
    Due => "due",
    Overdue => "overdue",
    Final => "final",
    Custom => "custom",
});

text_enum!(ReminderStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
    Cancelled => "cancelled",
});

text_enum!(DeliveryChannel {
    Email => "email",
    Sms => "sms",
    InApp => "in_app",
});

text_enum!(BudgetPeriod {
    Monthly => "monthly",
    Quarterly => "quarterly",
    Annual => "annual",
});

impl Default for DeliveryChannel {
    fn default() -> Self {
        Self::Email
    }
}

impl EntryType {
    pub fn for_deposit(is_deposit: bool) -> Self {
        if is_deposit {
            Self::Income
        } else {
            Self::Expense
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub current_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Id,
    pub user_id: Id,
    pub property_id: Option<Id>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub lease_start: Option<NaiveDate>,
    pub lease_end: Option<NaiveDate>,
    pub rent_amount: f64,
    /// Day of month rent falls due, 1..=28.
    pub rent_due_day: u32,
    pub active: bool,
}

impl Tenant {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Due date of this tenant's rent within the month containing `date`.
    pub fn due_date_in_month_of(&self, date: NaiveDate) -> NaiveDate {
        let day = self.rent_due_day.clamp(1, 28);
        NaiveDate::from_ymd_opt(date.year(), date.month(), day).unwrap_or_else(|| month_start(date))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Id,
    pub user_id: Id,
    pub tenant_id: Id,
    pub property_id: Option<Id>,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub date_paid: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub transaction_id: Option<Id>,
    pub notes: Option<String>,
}

impl Payment {
    /// Keeps `status == Received` and `date_paid.is_some()` in lockstep.
    pub fn mark_received(&mut self, date_paid: NaiveDate, transaction_id: Option<Id>) {
        self.status = PaymentStatus::Received;
        self.date_paid = Some(date_paid);
        if transaction_id.is_some() {
            self.transaction_id = transaction_id;
        }
    }

    pub fn is_received(&self) -> bool {
        self.status == PaymentStatus::Received
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub balance: f64,
    pub currency: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatement {
    pub id: Id,
    pub user_id: Id,
    pub account_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub starting_balance: f64,
    pub ending_balance: f64,
    pub transaction_count: i64,
    pub processed: bool,
    pub reconciled: bool,
    /// False when the declared balances disagree with the contained rows.
    pub balance_verified: bool,
    pub processing_error: Option<String>,
    pub checksum: Option<String>,
    pub source_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Id,
    pub statement_id: Id,
    pub account_id: Id,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub is_deposit: bool,
    pub balance: Option<f64>,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub status: TransactionStatus,
    pub category_id: Option<Id>,
    pub tenant_id: Option<Id>,
    pub payment_id: Option<Id>,
    pub property_id: Option<Id>,
    pub reconciled: bool,
    pub review_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub category_type: EntryType,
    pub is_default: bool,
}

/// A classified income or expense record; the only rows the aggregator sums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Id,
    pub user_id: Id,
    pub date: NaiveDate,
    pub description: String,
    /// Non-negative magnitude; direction lives in `entry_type`.
    pub amount: f64,
    pub entry_type: EntryType,
    pub category_id: Option<Id>,
    pub property_id: Option<Id>,
    pub bank_transaction_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: Id,
    pub user_id: Id,
    pub category_id: Id,
    pub name: String,
    pub amount: f64,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxYear {
    pub id: Id,
    pub user_id: Id,
    pub label: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub tax_rate: Option<f64>,
    pub estimated_tax: Option<f64>,
    pub is_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TaxYear {
    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReminder {
    pub id: Id,
    pub user_id: Id,
    pub payment_id: Id,
    pub tenant_id: Id,
    pub reminder_type: ReminderType,
    pub status: ReminderStatus,
    pub scheduled_date: NaiveDate,
    pub sent_date: Option<NaiveDate>,
    pub subject: String,
    pub message: String,
    pub channel: DeliveryChannel,
    pub response_received: bool,
    pub response_date: Option<NaiveDate>,
    pub response_message: Option<String>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Date windows
// ---------------------------------------------------------------------------

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn month_of(date: NaiveDate) -> Self {
        Self {
            start: month_start(date),
            end: month_end(date),
        }
    }

    pub fn quarter_of(date: NaiveDate) -> Self {
        let first_month = (date.month0() / 3) * 3 + 1;
        let start = NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date);
        let last = NaiveDate::from_ymd_opt(date.year(), first_month + 2, 1).unwrap_or(date);
        Self {
            start,
            end: month_end(last),
        }
    }

    pub fn year_of(date: NaiveDate) -> Self {
        Self::calendar_year(date.year())
    }

    pub fn calendar_year(year: i32) -> Self {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    /// Twelve months starting at `start`, ending the day before the anniversary.
    pub fn twelve_months_from(start: NaiveDate) -> Self {
        let end = start
            .checked_add_months(chrono::Months::new(12))
            .map(|d| d - Duration::days(1))
            .unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .map(|d| d - Duration::days(1))
        .unwrap_or(date)
}

pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

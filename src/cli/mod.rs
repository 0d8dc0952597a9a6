pub mod accounts;
pub mod budgets;
pub mod classify;
pub mod demo;
pub mod ingest;
pub mod init;
pub mod late;
pub mod payments;
pub mod remind;
pub mod report;
pub mod review;
pub mod taxyear;
pub mod tenants;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use rentbook::error::{RentbookError, Result};
use rentbook::intake::parse_date;
use rentbook::models::{BudgetPeriod, DeliveryChannel, Id, PaymentStatus};
use rentbook::service::{Pipeline, PipelineConfig};
use rentbook::settings::Settings;
use rentbook::store;

/// The configured store and the landlord the command acts for.
pub struct Session {
    pub pipeline: Pipeline,
    pub user_id: Id,
    pub currency: String,
}

impl Session {
    pub fn open(settings: &Settings, today: Option<NaiveDate>) -> Result<Self> {
        let store = store::open(settings.storage, &settings.data_path())?;
        let mut pipeline = Pipeline::new(store, PipelineConfig::from(settings));
        if let Some(today) = today {
            pipeline = pipeline.with_today(today);
        }
        Ok(Self {
            pipeline,
            user_id: settings.user_id,
            currency: settings.currency.clone(),
        })
    }
}

pub(crate) fn parse_date_arg(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| {
        RentbookError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD"))
    })
}

/// `YYYY-MM` to the first day of that month.
pub(crate) fn parse_month_arg(raw: &str) -> Result<NaiveDate> {
    parse_date(&format!("{raw}-01")).ok_or_else(|| {
        RentbookError::Validation(format!("invalid month '{raw}', expected YYYY-MM"))
    })
}

#[derive(Parser)]
#[command(
    name = "rentbook",
    version,
    about = "Rent reconciliation books for small landlords."
)]
pub struct Cli {
    /// Treat this date (YYYY-MM-DD) as today
    #[arg(long, global = true)]
    pub today: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write settings and prepare the data directory.
    Init {
        /// Path for rentbook data (default: ~/Documents/rentbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Storage backend: sqlite or memory
        #[arg(long)]
        storage: Option<String>,
    },
    /// Manage bank accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Manage tenants.
    Tenants {
        #[command(subcommand)]
        command: TenantsCommands,
    },
    /// Manage expected and received rent payments.
    Payments {
        #[command(subcommand)]
        command: PaymentsCommands,
    },
    /// Ingest a CSV bank statement into an account.
    Ingest {
        /// Path to the statement file
        file: String,
        /// Bank account ID
        #[arg(long)]
        account: Id,
    },
    /// Match statement transactions to rent payments and categories.
    Classify {
        /// Statement ID (default: every statement)
        statement: Option<Id>,
    },
    /// Work through transactions that need a decision.
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Manage budgets.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Open, close and list tax years.
    Taxyear {
        #[command(subcommand)]
        command: TaxYearCommands,
    },
    /// List tenants who are behind on rent.
    Late {
        /// Move unpaid payments to late or overdue first
        #[arg(long)]
        refresh: bool,
    },
    /// Schedule, deliver and track payment reminders.
    Remind {
        #[command(subcommand)]
        command: RemindCommands,
    },
    /// Run sample tenants and a statement through the whole pipeline in memory.
    Demo,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a bank account.
    Add {
        /// Account name, e.g. 'Operating Checking'
        name: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: f64,
        /// Mark as the default account
        #[arg(long)]
        default: bool,
    },
    /// List bank accounts.
    List,
}

#[derive(Subcommand)]
pub enum TenantsCommands {
    /// Add an active tenant.
    Add {
        first_name: String,
        last_name: String,
        /// Monthly rent
        #[arg(long)]
        rent: f64,
        /// Day of month rent is due (1-28)
        #[arg(long = "due-day", default_value = "1")]
        due_day: u32,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List tenants.
    List,
    /// Stop matching and reminding a tenant who moved out.
    Deactivate {
        /// Tenant ID (shown in `rentbook tenants list`)
        id: Id,
    },
}

#[derive(Subcommand)]
pub enum PaymentsCommands {
    /// Record an expected or received payment.
    Add {
        /// Tenant ID
        tenant: Id,
        /// Due date: YYYY-MM-DD
        #[arg(long)]
        due: String,
        /// Amount (default: the tenant's rent)
        #[arg(long)]
        amount: Option<f64>,
        /// pending, received, late, overdue, partially_paid, waived
        #[arg(long, default_value = "pending")]
        status: PaymentStatus,
    },
    /// List payments, newest first.
    List {
        /// Only this tenant
        #[arg(long)]
        tenant: Option<Id>,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List transactions flagged for review.
    List,
    /// Assign a category to a transaction and post it to the ledger.
    Assign {
        /// Transaction ID
        transaction: Id,
        /// Category name
        #[arg(long)]
        category: String,
    },
    /// Mark a transaction as not relevant to the books.
    Ignore {
        /// Transaction ID
        transaction: Id,
    },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Add a budget for a category.
    Add {
        /// Category name
        category: String,
        /// Budgeted amount per period
        #[arg(long)]
        amount: f64,
        /// monthly, quarterly or annual
        #[arg(long, default_value = "monthly")]
        period: BudgetPeriod,
        /// Budget name (default: the category name)
        #[arg(long)]
        name: Option<String>,
        /// First day the budget applies: YYYY-MM-DD (default: today)
        #[arg(long)]
        start: Option<String>,
        /// Last day the budget applies: YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
    },
    /// List budgets.
    List,
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Income and expenses by category.
    Summary {
        /// Month: YYYY-MM
        #[arg(long)]
        month: Option<String>,
        /// Calendar year
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Income, expenses and net per month or quarter.
    Periods {
        /// Calendar year (default: this year)
        #[arg(long)]
        year: Option<i32>,
        /// Group by quarter instead of month
        #[arg(long)]
        quarterly: bool,
    },
    /// Budget versus actual for the current period.
    Budgets,
}

#[derive(Subcommand)]
pub enum TaxYearCommands {
    /// Open a twelve-month tax year.
    Open {
        /// Year label, e.g. 2024
        label: i32,
        /// First day: YYYY-MM-DD (default: January 1 of the label year)
        #[arg(long)]
        start: Option<String>,
    },
    /// Snapshot totals and lock the year.
    Close {
        /// Tax year ID (shown in `rentbook taxyear list`)
        id: Id,
        /// Tax rate in percent (default: from settings)
        #[arg(long)]
        rate: Option<f64>,
    },
    /// List tax years.
    List,
}

#[derive(Subcommand)]
pub enum RemindCommands {
    /// Create reminders for tenants who are behind.
    Schedule,
    /// Send every pending reminder that is due.
    Deliver,
    /// List reminders.
    List,
    /// Write a custom reminder for a payment.
    Custom {
        /// Payment ID
        payment: Id,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        message: String,
        /// Send date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// email, sms or in_app
        #[arg(long, default_value = "email")]
        channel: DeliveryChannel,
    },
    /// Put a failed reminder back in the queue.
    Retry { id: Id },
    /// Cancel a pending reminder.
    Cancel { id: Id },
    /// Record a tenant's reply to a sent reminder.
    Respond {
        id: Id,
        #[arg(long)]
        message: Option<String>,
    },
}

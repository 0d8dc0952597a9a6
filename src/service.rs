//! The pipeline as a single entry point for callers such as an HTTP layer
//! or the CLI. Owns the injected store and the policy knobs.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::classifier::{self, ClassifyReport};
use crate::detector::{self, LatePayer};
use crate::error::Result;
use crate::intake::{self, IntakeOutcome, RawTransaction, StatementExtractor, StatementMetadata};
use crate::ledger::{self, BudgetVariance, Granularity, LedgerFilter, LedgerSummary, PeriodTotals};
use crate::models::{BankTransaction, DateWindow, Id, LedgerEntry, Payment, PaymentReminder, TaxYear};
use crate::reminders::{self, DeliveryReport, Dispatcher, ReminderPolicy};
use crate::settings::Settings;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineConfig {
    pub reminders: ReminderPolicy,
    /// Used when a tax year is closed without an explicit rate.
    pub default_tax_rate: Option<f64>,
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            reminders: settings.reminder_policy(),
            default_tax_rate: settings.default_tax_rate,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    config: PipelineConfig,
    fixed_today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            fixed_today: None,
        }
    }

    /// Pins "today" for date-relative operations.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed_today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -- intake ------------------------------------------------------------

    pub fn ingest_statement(&self, metadata: &StatementMetadata, raw: &[RawTransaction]) -> Result<IntakeOutcome> {
        intake::ingest_statement(self.store(), metadata, raw)
    }

    pub fn ingest_document(
        &self,
        account_id: Id,
        source_name: &str,
        bytes: &[u8],
        file_type: &str,
        extractor: &dyn StatementExtractor,
    ) -> Result<IntakeOutcome> {
        intake::ingest_document(
            self.store(),
            account_id,
            source_name,
            bytes,
            file_type,
            extractor,
            self.today(),
        )
    }

    // -- classification ----------------------------------------------------

    pub fn classify(&self, statement_id: Id) -> Result<ClassifyReport> {
        classifier::classify_statement(self.store(), statement_id)
    }

    pub fn classify_user(&self, user_id: Id) -> Result<ClassifyReport> {
        classifier::classify_user(self.store(), user_id)
    }

    pub fn assign_category(&self, transaction_id: Id, category_id: Id) -> Result<BankTransaction> {
        classifier::assign_category(self.store(), transaction_id, category_id)
    }

    pub fn ignore_transaction(&self, transaction_id: Id) -> Result<BankTransaction> {
        classifier::ignore_transaction(self.store(), transaction_id)
    }

    // -- ledger ------------------------------------------------------------

    pub fn summarize(&self, user_id: Id, window: DateWindow, filter: &LedgerFilter) -> Result<LedgerSummary> {
        ledger::summarize(self.store(), user_id, window, filter)
    }

    pub fn period_totals(&self, user_id: Id, year: i32, granularity: Granularity) -> Result<Vec<PeriodTotals>> {
        ledger::period_totals(self.store(), user_id, year, granularity)
    }

    pub fn budget_variance(&self, user_id: Id) -> Result<Vec<BudgetVariance>> {
        ledger::budget_variance(self.store(), user_id, self.today())
    }

    pub fn record_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        ledger::record_entry(self.store(), entry)
    }

    pub fn open_tax_year(&self, user_id: Id, label: i32, start_date: NaiveDate) -> Result<TaxYear> {
        ledger::open_tax_year(self.store(), user_id, label, start_date)
    }

    pub fn close_tax_year(&self, tax_year_id: Id, tax_rate: Option<f64>) -> Result<TaxYear> {
        ledger::close_tax_year(self.store(), tax_year_id, tax_rate.or(self.config.default_tax_rate))
    }

    // -- late payments and reminders ---------------------------------------

    pub fn late_tenants(&self, user_id: Id) -> Result<Vec<LatePayer>> {
        detector::late_tenants(self.store(), user_id, self.today())
    }

    pub fn refresh_payment_statuses(&self, user_id: Id) -> Result<Vec<Payment>> {
        detector::refresh_payment_statuses(
            self.store(),
            user_id,
            self.today(),
            self.config.reminders.grace_days,
        )
    }

    pub fn schedule_reminders(&self, user_id: Id) -> Result<Vec<PaymentReminder>> {
        reminders::schedule_reminders(self.store(), user_id, self.today(), &self.config.reminders)
    }

    pub fn deliver_reminders(&self, user_id: Id, dispatcher: &mut Dispatcher) -> Result<DeliveryReport> {
        reminders::deliver_due(self.store(), user_id, self.today(), dispatcher)
    }
}

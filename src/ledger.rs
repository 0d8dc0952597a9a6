use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RentbookError, Result};
use crate::models::{
    Budget, BudgetPeriod, Category, DateWindow, EntryType, Id, LedgerEntry, TaxYear,
};
use crate::store::{require, Store};

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub property_id: Option<Id>,
    pub category_id: Option<Id>,
    pub entry_type: Option<EntryType>,
}

impl LedgerFilter {
    fn admits(&self, entry: &LedgerEntry) -> bool {
        self.property_id.map_or(true, |p| entry.property_id == Some(p))
            && self.category_id.map_or(true, |c| entry.category_id == Some(c))
            && self.entry_type.map_or(true, |t| entry.entry_type == t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAmount {
    pub category_id: Id,
    pub category_name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub window: DateWindow,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub income_by_category: Vec<CategoryAmount>,
    pub expenses_by_category: Vec<CategoryAmount>,
}

fn check_window(window: &DateWindow) -> Result<()> {
    if window.start > window.end {
        return Err(RentbookError::Validation(format!(
            "date window starts ({}) after it ends ({})",
            window.start, window.end
        )));
    }
    Ok(())
}

fn breakdown(totals: BTreeMap<Id, f64>, names: &HashMap<Id, String>) -> Vec<CategoryAmount> {
    let mut rows: Vec<CategoryAmount> = totals
        .into_iter()
        .map(|(category_id, amount)| CategoryAmount {
            category_id,
            category_name: names
                .get(&category_id)
                .cloned()
                .unwrap_or_else(|| format!("Category {category_id}")),
            amount,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category_name.cmp(&b.category_name))
    });
    rows
}

/// Income and expense totals over an inclusive window. Only ledger entries
/// count; bank transactions still awaiting classification never do.
pub fn summarize(
    store: &dyn Store,
    user_id: Id,
    window: DateWindow,
    filter: &LedgerFilter,
) -> Result<LedgerSummary> {
    check_window(&window)?;
    let names: HashMap<Id, String> = store
        .categories_for_user(user_id)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut income: BTreeMap<Id, f64> = BTreeMap::new();
    let mut expenses: BTreeMap<Id, f64> = BTreeMap::new();

    for entry in store.ledger_entries(user_id, window)? {
        if !filter.admits(&entry) {
            continue;
        }
        let (total, by_category) = match entry.entry_type {
            EntryType::Income => (&mut total_income, &mut income),
            EntryType::Expense => (&mut total_expenses, &mut expenses),
        };
        *total += entry.amount;
        if let Some(category_id) = entry.category_id {
            *by_category.entry(category_id).or_default() += entry.amount;
        }
    }

    Ok(LedgerSummary {
        window,
        total_income,
        total_expenses,
        net_income: total_income - total_expenses,
        income_by_category: breakdown(income, &names),
        expenses_by_category: breakdown(expenses, &names),
    })
}

// ---------------------------------------------------------------------------
// Period totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Monthly,
    Quarterly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

fn periods_of(year: i32, granularity: Granularity) -> Vec<(String, DateWindow)> {
    let months: Vec<u32> = match granularity {
        Granularity::Monthly => (1..=12).collect(),
        Granularity::Quarterly => vec![1, 4, 7, 10],
    };
    months
        .into_iter()
        .filter_map(|m| NaiveDate::from_ymd_opt(year, m, 1))
        .map(|first| match granularity {
            Granularity::Monthly => (first.format("%Y-%m").to_string(), DateWindow::month_of(first)),
            Granularity::Quarterly => (
                format!("{year}-Q{}", first.month0() / 3 + 1),
                DateWindow::quarter_of(first),
            ),
        })
        .collect()
}

pub fn period_totals(
    store: &dyn Store,
    user_id: Id,
    year: i32,
    granularity: Granularity,
) -> Result<Vec<PeriodTotals>> {
    let entries = store.ledger_entries(user_id, DateWindow::calendar_year(year))?;
    Ok(periods_of(year, granularity)
        .into_iter()
        .map(|(label, window)| {
            let (mut income, mut expenses) = (0.0, 0.0);
            for e in entries.iter().filter(|e| window.contains(e.date)) {
                match e.entry_type {
                    EntryType::Income => income += e.amount,
                    EntryType::Expense => expenses += e.amount,
                }
            }
            PeriodTotals {
                label,
                start: window.start,
                end: window.end,
                income,
                expenses,
                net: income - expenses,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetVariance {
    pub budget_id: Id,
    pub name: String,
    pub category_id: Id,
    pub period: BudgetPeriod,
    pub window: DateWindow,
    pub budgeted: f64,
    pub actual: f64,
    pub variance: f64,
    /// `None` when the budgeted amount is zero.
    pub percent_used: Option<f64>,
}

fn is_active(budget: &Budget, today: NaiveDate) -> bool {
    budget.start_date <= today && budget.end_date.map_or(true, |end| today <= end)
}

fn current_window(period: BudgetPeriod, today: NaiveDate) -> DateWindow {
    match period {
        BudgetPeriod::Monthly => DateWindow::month_of(today),
        BudgetPeriod::Quarterly => DateWindow::quarter_of(today),
        BudgetPeriod::Annual => DateWindow::year_of(today),
    }
}

pub fn percent_used(actual: f64, budgeted: f64) -> Option<f64> {
    (budgeted != 0.0).then(|| actual * 100.0 / budgeted)
}

/// Actual spend against every budget active on `today`, over the budget's
/// current month, quarter or year.
pub fn budget_variance(store: &dyn Store, user_id: Id, today: NaiveDate) -> Result<Vec<BudgetVariance>> {
    let categories: HashMap<Id, Category> = store
        .categories_for_user(user_id)?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut rows = Vec::new();
    for budget in store.budgets_for_user(user_id)? {
        if !is_active(&budget, today) {
            continue;
        }
        let window = current_window(budget.period, today);
        let entry_type = categories.get(&budget.category_id).map(|c| c.category_type);
        let actual: f64 = store
            .ledger_entries(user_id, window)?
            .iter()
            .filter(|e| e.category_id == Some(budget.category_id))
            .filter(|e| entry_type.map_or(true, |t| e.entry_type == t))
            .map(|e| e.amount)
            .sum();
        rows.push(BudgetVariance {
            budget_id: budget.id,
            name: budget.name,
            category_id: budget.category_id,
            period: budget.period,
            window,
            budgeted: budget.amount,
            actual,
            variance: budget.amount - actual,
            percent_used: percent_used(actual, budget.amount),
        });
    }
    Ok(rows)
}

pub fn add_budget(store: &dyn Store, budget: Budget) -> Result<Budget> {
    if !budget.amount.is_finite() || budget.amount < 0.0 {
        return Err(RentbookError::Validation(format!(
            "budget amount must be a non-negative number, got {}",
            budget.amount
        )));
    }
    store
        .category(budget.category_id)?
        .filter(|c| c.user_id == budget.user_id)
        .ok_or_else(|| RentbookError::not_found("category", budget.category_id))?;
    store.insert_budget(budget)
}

// ---------------------------------------------------------------------------
// Tax years
// ---------------------------------------------------------------------------

pub fn open_tax_year(store: &dyn Store, user_id: Id, label: i32, start_date: NaiveDate) -> Result<TaxYear> {
    if store.tax_years_for_user(user_id)?.iter().any(|y| y.label == label) {
        return Err(RentbookError::Conflict(format!("tax year {label} already exists")));
    }
    let window = DateWindow::twelve_months_from(start_date);
    store.insert_tax_year(TaxYear {
        id: 0,
        user_id,
        label,
        start_date: window.start,
        end_date: window.end,
        total_income: 0.0,
        total_expenses: 0.0,
        net_income: 0.0,
        tax_rate: None,
        estimated_tax: None,
        is_closed: false,
        closed_at: None,
    })
}

/// Snapshots the year's totals and locks it. `tax_rate` is a percentage.
pub fn close_tax_year(store: &dyn Store, tax_year_id: Id, tax_rate: Option<f64>) -> Result<TaxYear> {
    let mut year = require(store.tax_year(tax_year_id)?, "tax year", tax_year_id)?;
    if year.is_closed {
        return Err(RentbookError::Conflict(format!("tax year {} is already closed", year.label)));
    }
    if let Some(rate) = tax_rate {
        if !(0.0..=100.0).contains(&rate) {
            return Err(RentbookError::Validation(format!(
                "tax rate must be between 0 and 100, got {rate}"
            )));
        }
    }

    let summary = summarize(store, year.user_id, year.window(), &LedgerFilter::default())?;
    year.total_income = summary.total_income;
    year.total_expenses = summary.total_expenses;
    year.net_income = summary.net_income;
    year.tax_rate = tax_rate;
    year.estimated_tax = tax_rate.map(|rate| summary.net_income.max(0.0) * rate / 100.0);
    year.is_closed = true;
    year.closed_at = Some(Utc::now());
    store.close_tax_year(&year)?;

    info!(
        tax_year_id,
        label = year.label,
        net_income = year.net_income,
        estimated_tax = ?year.estimated_tax,
        "tax year closed"
    );
    Ok(year)
}

// ---------------------------------------------------------------------------
// Manual entries
// ---------------------------------------------------------------------------

pub fn record_entry(store: &dyn Store, entry: LedgerEntry) -> Result<LedgerEntry> {
    if entry.description.trim().is_empty() {
        return Err(RentbookError::Validation("entry description is required".to_string()));
    }
    if !entry.amount.is_finite() || entry.amount < 0.0 {
        return Err(RentbookError::Validation(format!(
            "entry amount must be a non-negative number, got {}",
            entry.amount
        )));
    }
    if let Some(category_id) = entry.category_id {
        let category = store
            .category(category_id)?
            .filter(|c| c.user_id == entry.user_id)
            .ok_or_else(|| RentbookError::not_found("category", category_id))?;
        if category.category_type != entry.entry_type {
            return Err(RentbookError::Validation(format!(
                "category {} is {}, entry is {}",
                category.name, category.category_type, entry.entry_type
            )));
        }
    }
    if let Some(closed) = closed_tax_year_for(store, entry.user_id, entry.date)? {
        return Err(RentbookError::Conflict(format!(
            "{} falls in closed tax year {}",
            entry.date, closed.label
        )));
    }
    store.insert_ledger_entry(entry)
}

/// The closed tax year covering `date`, if any. Nothing may post into it.
pub fn closed_tax_year_for(store: &dyn Store, user_id: Id, date: NaiveDate) -> Result<Option<TaxYear>> {
    Ok(store
        .tax_years_for_user(user_id)?
        .into_iter()
        .find(|y| y.is_closed && y.window().contains(date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ensure_default_categories;
    use crate::testutil::{d, test_store};

    fn category(store: &dyn Store, name: &str) -> Category {
        ensure_default_categories(store, 1)
            .unwrap()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
    }

    fn entry(
        store: &dyn Store,
        date: &str,
        amount: f64,
        category_name: Option<&str>,
        entry_type: EntryType,
    ) -> LedgerEntry {
        record_entry(
            store,
            LedgerEntry {
                id: 0,
                user_id: 1,
                date: d(date),
                description: "entry".into(),
                amount,
                entry_type,
                category_id: category_name.map(|n| category(store, n).id),
                property_id: None,
                bank_transaction_id: None,
            },
        )
        .unwrap()
    }

    fn budget(store: &dyn Store, category_name: &str, amount: f64, period: BudgetPeriod) -> Budget {
        add_budget(
            store,
            Budget {
                id: 0,
                user_id: 1,
                category_id: category(store, category_name).id,
                name: format!("{category_name} budget"),
                amount,
                period,
                start_date: d("2024-01-01"),
                end_date: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_summary_totals_and_breakdown() {
        let store = test_store();
        entry(&store, "2024-03-02", 950.0, Some("Rent Income"), EntryType::Income);
        entry(&store, "2024-03-05", 120.0, Some("Utilities"), EntryType::Expense);
        entry(&store, "2024-03-09", 300.0, Some("Maintenance"), EntryType::Expense);
        entry(&store, "2024-03-12", 25.0, None, EntryType::Expense);
        entry(&store, "2024-04-01", 950.0, Some("Rent Income"), EntryType::Income);

        let s = summarize(&store, 1, DateWindow::month_of(d("2024-03-01")), &LedgerFilter::default()).unwrap();
        assert_eq!(s.total_income, 950.0);
        assert_eq!(s.total_expenses, 445.0);
        assert_eq!(s.net_income, 505.0);
        let names: Vec<&str> = s.expenses_by_category.iter().map(|c| c.category_name.as_str()).collect();
        assert_eq!(names, vec!["Maintenance", "Utilities"]);
        assert_eq!(s.income_by_category.len(), 1);
    }

    #[test]
    fn test_summary_filters() {
        let store = test_store();
        entry(&store, "2024-03-02", 950.0, Some("Rent Income"), EntryType::Income);
        entry(&store, "2024-03-05", 120.0, Some("Utilities"), EntryType::Expense);
        let only_expenses = LedgerFilter {
            entry_type: Some(EntryType::Expense),
            ..Default::default()
        };
        let s = summarize(&store, 1, DateWindow::calendar_year(2024), &only_expenses).unwrap();
        assert_eq!(s.total_income, 0.0);
        assert_eq!(s.total_expenses, 120.0);

        let by_property = LedgerFilter {
            property_id: Some(9),
            ..Default::default()
        };
        let s = summarize(&store, 1, DateWindow::calendar_year(2024), &by_property).unwrap();
        assert_eq!(s.net_income, 0.0);
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let store = test_store();
        let window = DateWindow::new(d("2024-05-01"), d("2024-04-01"));
        assert!(matches!(
            summarize(&store, 1, window, &LedgerFilter::default()),
            Err(RentbookError::Validation(_))
        ));
    }

    #[test]
    fn test_period_totals() {
        let store = test_store();
        entry(&store, "2024-02-02", 950.0, Some("Rent Income"), EntryType::Income);
        entry(&store, "2024-05-05", 200.0, Some("Insurance"), EntryType::Expense);
        let months = period_totals(&store, 1, 2024, Granularity::Monthly).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months[1].label, "2024-02");
        assert_eq!(months[1].income, 950.0);
        assert_eq!(months[4].net, -200.0);

        let quarters = period_totals(&store, 1, 2024, Granularity::Quarterly).unwrap();
        assert_eq!(quarters.len(), 4);
        assert_eq!(quarters[1].label, "2024-Q2");
        assert_eq!(quarters[1].expenses, 200.0);
        assert_eq!(quarters[0].end, d("2024-03-31"));
    }

    #[test]
    fn test_budget_variance() {
        let store = test_store();
        budget(&store, "Utilities", 500.0, BudgetPeriod::Monthly);
        entry(&store, "2024-03-05", 120.0, Some("Utilities"), EntryType::Expense);
        entry(&store, "2024-02-05", 999.0, Some("Utilities"), EntryType::Expense);

        let rows = budget_variance(&store, 1, d("2024-03-20")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actual, 120.0);
        assert_eq!(rows[0].variance, 380.0);
        assert_eq!(rows[0].percent_used, Some(24.0));
    }

    #[test]
    fn test_zero_budget_reports_no_percentage() {
        let store = test_store();
        budget(&store, "Maintenance", 0.0, BudgetPeriod::Quarterly);
        entry(&store, "2024-03-05", 75.0, Some("Maintenance"), EntryType::Expense);

        let rows = budget_variance(&store, 1, d("2024-03-20")).unwrap();
        assert_eq!(rows[0].percent_used, None);
        assert_eq!(rows[0].variance, -75.0);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json["percent_used"].is_null());
    }

    #[test]
    fn test_inactive_budget_is_skipped() {
        let store = test_store();
        budget(&store, "Utilities", 100.0, BudgetPeriod::Annual);
        assert!(budget_variance(&store, 1, d("2023-12-31")).unwrap().is_empty());
    }

    #[test]
    fn test_tax_year_round_trip() {
        let store = test_store();
        let year = open_tax_year(&store, 1, 2024, d("2024-01-01")).unwrap();
        assert_eq!(year.end_date, d("2024-12-31"));
        entry(&store, "2024-03-02", 12_000.0, Some("Rent Income"), EntryType::Income);
        entry(&store, "2024-07-05", 2_000.0, Some("Property Tax"), EntryType::Expense);

        let closed = close_tax_year(&store, year.id, Some(25.0)).unwrap();
        assert!(closed.is_closed && closed.closed_at.is_some());
        assert_eq!(closed.net_income, 10_000.0);
        assert_eq!(closed.estimated_tax, Some(2_500.0));

        assert!(matches!(
            close_tax_year(&store, year.id, Some(30.0)),
            Err(RentbookError::Conflict(_))
        ));
        let stored = store.tax_year(year.id).unwrap().unwrap();
        assert_eq!(stored.estimated_tax, Some(2_500.0));
        assert_eq!(stored.tax_rate, Some(25.0));

        let late = LedgerEntry {
            id: 0,
            user_id: 1,
            date: d("2024-11-11"),
            description: "late invoice".into(),
            amount: 10.0,
            entry_type: EntryType::Expense,
            category_id: None,
            property_id: None,
            bank_transaction_id: None,
        };
        assert!(matches!(record_entry(&store, late), Err(RentbookError::Conflict(_))));
    }

    #[test]
    fn test_closed_year_summary_matches_snapshot() {
        let store = test_store();
        let account = crate::testutil::add_account(&store, 1, 0.0);
        let year = open_tax_year(&store, 1, 2024, d("2024-01-01")).unwrap();
        entry(&store, "2024-02-01", 1_000.0, Some("Rent Income"), EntryType::Income);
        let closed = close_tax_year(&store, year.id, None).unwrap();

        let statement = crate::intake::ingest_statement(
            &store,
            &crate::intake::StatementMetadata {
                account_id: account.id,
                start_date: d("2024-06-01"),
                end_date: d("2024-06-30"),
                starting_balance: 0.0,
                ending_balance: -300.0,
            },
            &[crate::intake::RawTransaction {
                date: "2024-06-05".into(),
                description: "MAINTENANCE PLUMBER".into(),
                amount: 300.0,
                is_deposit: false,
                balance: None,
                reference: None,
                counterparty: None,
            }],
        )
        .unwrap()
        .statement;
        crate::classifier::classify_statement(&store, statement.id).unwrap();

        let s = summarize(&store, 1, closed.window(), &LedgerFilter::default()).unwrap();
        assert_eq!(s.total_income, closed.total_income);
        assert_eq!(s.total_expenses, closed.total_expenses);
        assert_eq!(s.net_income, closed.net_income);
    }

    #[test]
    fn test_loss_year_estimates_zero_tax() {
        let store = test_store();
        let year = open_tax_year(&store, 1, 2023, d("2023-04-06")).unwrap();
        entry(&store, "2023-06-01", 500.0, Some("Mortgage"), EntryType::Expense);
        let closed = close_tax_year(&store, year.id, Some(20.0)).unwrap();
        assert_eq!(closed.net_income, -500.0);
        assert_eq!(closed.estimated_tax, Some(0.0));
        assert!(matches!(
            open_tax_year(&store, 1, 2023, d("2023-01-01")),
            Err(RentbookError::Conflict(_))
        ));
    }

    #[test]
    fn test_bad_rate_and_mismatched_category() {
        let store = test_store();
        let year = open_tax_year(&store, 1, 2024, d("2024-01-01")).unwrap();
        assert!(matches!(
            close_tax_year(&store, year.id, Some(140.0)),
            Err(RentbookError::Validation(_))
        ));
        assert!(!store.tax_year(year.id).unwrap().unwrap().is_closed);

        let wrong = LedgerEntry {
            id: 0,
            user_id: 1,
            date: d("2024-02-01"),
            description: "rent?".into(),
            amount: 10.0,
            entry_type: EntryType::Expense,
            category_id: Some(category(&store, "Rent Income").id),
            property_id: None,
            bank_transaction_id: None,
        };
        assert!(matches!(record_entry(&store, wrong), Err(RentbookError::Validation(_))));
    }
}

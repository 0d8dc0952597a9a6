use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::db::{DEFAULT_CATEGORIES, RENT_INCOME};
use crate::error::{RentbookError, Result};
use crate::ledger::closed_tax_year_for;
use crate::models::{
    same_month, BankStatement, BankTransaction, Category, EntryType, Id, LedgerEntry, Payment,
    PaymentStatus, TaxYear, Tenant, TransactionStatus,
};
use crate::store::{require, ClassificationCommit, Store};

/// Rent and deposit amounts closer than this are treated as equal.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

const NO_MATCH: &str = "No matching tenant or category";

// ---------------------------------------------------------------------------
// Strategies, tried in order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Deposit equal to exactly one active tenant's rent with an open payment this month.
    RentAmount,
    /// A category name appears in the description.
    CategoryName,
    /// Nothing matched; park for manual review.
    Fallback,
}

pub const DEFAULT_STRATEGIES: &[MatchStrategy] = &[
    MatchStrategy::RentAmount,
    MatchStrategy::CategoryName,
    MatchStrategy::Fallback,
];

enum Decision {
    Matched {
        tenant: Tenant,
        payment: Payment,
        category: Category,
    },
    Categorized(Category),
    Review(String),
}

/// Per-run lookup state. `claimed` keeps one payment from absorbing two deposits.
struct Context {
    categories: Vec<Category>,
    active_tenants: Vec<Tenant>,
    closed_years: Vec<TaxYear>,
    claimed: HashSet<Id>,
}

impl MatchStrategy {
    fn decide(&self, store: &dyn Store, ctx: &Context, txn: &BankTransaction) -> Result<Option<Decision>> {
        match self {
            Self::RentAmount => match_rent_amount(store, ctx, txn),
            Self::CategoryName => Ok(match_category_name(ctx, txn).map(Decision::Categorized)),
            Self::Fallback => Ok(Some(Decision::Review(NO_MATCH.to_string()))),
        }
    }
}

fn match_rent_amount(store: &dyn Store, ctx: &Context, txn: &BankTransaction) -> Result<Option<Decision>> {
    if !txn.is_deposit {
        return Ok(None);
    }
    let amount = txn.amount.abs();
    let candidates: Vec<&Tenant> = ctx
        .active_tenants
        .iter()
        .filter(|t| (t.rent_amount - amount).abs() < AMOUNT_TOLERANCE)
        .collect();

    match candidates.as_slice() {
        [] => Ok(None),
        [tenant] => {
            let open = store.payments_for_tenant(tenant.id)?.into_iter().find(|p| {
                same_month(p.due_date, txn.transaction_date)
                    && p.status != PaymentStatus::Received
                    && !ctx.claimed.contains(&p.id)
            });
            let rent = ctx
                .categories
                .iter()
                .find(|c| c.name == RENT_INCOME && c.category_type == EntryType::Income);
            Ok(match (open, rent) {
                (Some(payment), Some(category)) => Some(Decision::Matched {
                    tenant: (*tenant).clone(),
                    payment,
                    category: category.clone(),
                }),
                _ => None,
            })
        }
        many => {
            let names: Vec<String> = many.iter().map(|t| t.full_name()).collect();
            warn!(
                transaction_id = txn.id,
                amount,
                tenants = many.len(),
                "ambiguous rent match"
            );
            Ok(Some(Decision::Review(format!(
                "Amount {amount:.2} matches rent of {} tenants: {}",
                many.len(),
                names.join(", ")
            ))))
        }
    }
}

fn match_category_name(ctx: &Context, txn: &BankTransaction) -> Option<Category> {
    let description = txn.description.to_lowercase();
    let direction = EntryType::for_deposit(txn.is_deposit);
    let mut ordered: Vec<&Category> = ctx
        .categories
        .iter()
        .filter(|c| !c.name.trim().is_empty())
        .collect();
    ordered.sort_by(|a, b| {
        (b.category_type == direction)
            .cmp(&(a.category_type == direction))
            .then(b.name.len().cmp(&a.name.len()))
            .then(a.id.cmp(&b.id))
    });
    ordered
        .into_iter()
        .find(|c| description.contains(&c.name.to_lowercase()))
        .cloned()
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionError {
    pub transaction_id: Id,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifyReport {
    pub matched: usize,
    pub processed: usize,
    pub needs_review: usize,
    pub skipped: usize,
    pub errors: Vec<TransactionError>,
}

impl ClassifyReport {
    pub fn merge(&mut self, other: ClassifyReport) {
        self.matched += other.matched;
        self.processed += other.processed;
        self.needs_review += other.needs_review;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Seeds the default category set the first time a user is classified.
pub fn ensure_default_categories(store: &dyn Store, user_id: Id) -> Result<Vec<Category>> {
    let existing = store.categories_for_user(user_id)?;
    if !existing.is_empty() {
        return Ok(existing);
    }
    let mut seeded = Vec::with_capacity(DEFAULT_CATEGORIES.len());
    for (name, category_type) in DEFAULT_CATEGORIES {
        seeded.push(store.insert_category(Category {
            id: 0,
            user_id,
            name: name.to_string(),
            category_type: *category_type,
            is_default: true,
        })?);
    }
    debug!(user_id, count = seeded.len(), "seeded default categories");
    Ok(seeded)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn is_settled(status: TransactionStatus) -> bool {
    matches!(
        status,
        TransactionStatus::Matched | TransactionStatus::Processed | TransactionStatus::Ignored
    )
}

fn statement_reconciled(statement: &BankStatement, rows: &[BankTransaction]) -> bool {
    statement.balance_verified && rows.iter().all(|r| r.reconciled)
}

fn ledger_entry_for(
    statement: &BankStatement,
    txn: &BankTransaction,
    category: &Category,
    property_id: Option<Id>,
) -> LedgerEntry {
    LedgerEntry {
        id: 0,
        user_id: statement.user_id,
        date: txn.transaction_date,
        description: txn.description.clone(),
        amount: txn.amount.abs(),
        entry_type: category.category_type,
        category_id: Some(category.id),
        property_id,
        bank_transaction_id: Some(txn.id),
    }
}

/// Runs the default strategy chain over one statement.
pub fn classify_statement(store: &dyn Store, statement_id: Id) -> Result<ClassifyReport> {
    classify_statement_with(store, statement_id, DEFAULT_STRATEGIES)
}

pub fn classify_statement_with(
    store: &dyn Store,
    statement_id: Id,
    strategies: &[MatchStrategy],
) -> Result<ClassifyReport> {
    let statement = require(store.statement(statement_id)?, "bank statement", statement_id)?;
    if !statement.processed {
        return Err(RentbookError::Validation(format!(
            "statement {statement_id} has not finished intake"
        )));
    }

    let mut ctx = Context {
        categories: ensure_default_categories(store, statement.user_id)?,
        active_tenants: store
            .tenants_for_user(statement.user_id)?
            .into_iter()
            .filter(|t| t.active)
            .collect(),
        closed_years: store
            .tax_years_for_user(statement.user_id)?
            .into_iter()
            .filter(|y| y.is_closed)
            .collect(),
        claimed: HashSet::new(),
    };

    let mut rows = store.bank_transactions_for_statement(statement_id)?;
    let mut report = ClassifyReport::default();

    for i in 0..rows.len() {
        if is_settled(rows[i].status) {
            report.skipped += 1;
            continue;
        }
        let txn_id = rows[i].id;
        match classify_one(store, &mut ctx, &statement, &mut rows, i, strategies) {
            Ok(status) => match status {
                TransactionStatus::Matched => report.matched += 1,
                TransactionStatus::Processed => report.processed += 1,
                _ => report.needs_review += 1,
            },
            Err(e) => {
                error!(statement_id, transaction_id = txn_id, error = %e, "classification failed");
                report.errors.push(TransactionError {
                    transaction_id: txn_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        statement_id,
        matched = report.matched,
        processed = report.processed,
        needs_review = report.needs_review,
        skipped = report.skipped,
        errors = report.errors.len(),
        "statement classified"
    );
    Ok(report)
}

fn classify_one(
    store: &dyn Store,
    ctx: &mut Context,
    statement: &BankStatement,
    rows: &mut [BankTransaction],
    index: usize,
    strategies: &[MatchStrategy],
) -> Result<TransactionStatus> {
    let original = &rows[index];
    let mut decision = None;
    for strategy in strategies {
        if let Some(found) = strategy.decide(store, ctx, original)? {
            debug!(transaction_id = original.id, ?strategy, "strategy decided");
            decision = Some(found);
            break;
        }
    }
    let mut decision = decision.unwrap_or_else(|| Decision::Review(NO_MATCH.to_string()));

    if !matches!(decision, Decision::Review(_)) {
        let date = original.transaction_date;
        if let Some(year) = ctx.closed_years.iter().find(|y| y.window().contains(date)) {
            warn!(transaction_id = original.id, tax_year = year.label, "transaction dated in closed tax year");
            decision = Decision::Review(format!("{date} falls in closed tax year {}", year.label));
        }
    }
    commit_decision(store, ctx, statement, rows, index, decision)
}

fn commit_decision(
    store: &dyn Store,
    ctx: &mut Context,
    statement: &BankStatement,
    rows: &mut [BankTransaction],
    index: usize,
    decision: Decision,
) -> Result<TransactionStatus> {
    let mut txn = rows[index].clone();
    txn.tenant_id = None;
    txn.payment_id = None;
    txn.property_id = None;
    txn.review_reason = None;
    let mut payment_update = None;
    let mut ledger_entry = None;
    match decision {
        Decision::Matched {
            tenant,
            mut payment,
            category,
        } => {
            txn.status = TransactionStatus::Matched;
            txn.category_id = Some(category.id);
            txn.tenant_id = Some(tenant.id);
            txn.payment_id = Some(payment.id);
            txn.property_id = payment.property_id.or(tenant.property_id);
            payment.mark_received(txn.transaction_date, Some(txn.id));
            ledger_entry = Some(ledger_entry_for(statement, &txn, &category, txn.property_id));
            payment_update = Some(payment);
        }
        Decision::Categorized(category) => {
            txn.status = TransactionStatus::Processed;
            txn.category_id = Some(category.id);
            ledger_entry = Some(ledger_entry_for(statement, &txn, &category, None));
        }
        Decision::Review(reason) => {
            txn.status = TransactionStatus::NeedsReview;
            txn.category_id = None;
            txn.review_reason = Some(reason);
        }
    }
    txn.reconciled = txn.category_id.is_some();

    let previous = std::mem::replace(&mut rows[index], txn.clone());
    let commit = ClassificationCommit {
        statement_reconciled: statement_reconciled(statement, rows),
        transaction: txn,
        payment: payment_update,
        ledger_entry,
    };
    match store.commit_classification(&commit) {
        Ok(_) => {}
        // Another run received this payment between our read and the commit.
        Err(RentbookError::Conflict(reason)) if commit.payment.is_some() => {
            rows[index] = previous;
            warn!(transaction_id = commit.transaction.id, %reason, "rent match lost to a concurrent run");
            if let Some(payment) = &commit.payment {
                ctx.claimed.insert(payment.id);
            }
            return commit_decision(store, ctx, statement, rows, index, Decision::Review(reason));
        }
        Err(e) => {
            rows[index] = previous;
            return Err(e);
        }
    }
    if let Some(payment) = &commit.payment {
        ctx.claimed.insert(payment.id);
    }
    debug!(
        transaction_id = commit.transaction.id,
        status = %commit.transaction.status,
        category_id = ?commit.transaction.category_id,
        "transaction classified"
    );
    Ok(commit.transaction.status)
}

/// Classifies every processed statement a user owns.
pub fn classify_user(store: &dyn Store, user_id: Id) -> Result<ClassifyReport> {
    let mut report = ClassifyReport::default();
    for statement in store.statements_for_user(user_id)? {
        if statement.processed {
            report.merge(classify_statement(store, statement.id)?);
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Manual review decisions
// ---------------------------------------------------------------------------

fn load_for_review(store: &dyn Store, transaction_id: Id) -> Result<(BankStatement, Vec<BankTransaction>, usize)> {
    let txn = require(store.bank_transaction(transaction_id)?, "bank transaction", transaction_id)?;
    let statement = require(store.statement(txn.statement_id)?, "bank statement", txn.statement_id)?;
    let rows = store.bank_transactions_for_statement(statement.id)?;
    let index = rows
        .iter()
        .position(|r| r.id == transaction_id)
        .ok_or_else(|| RentbookError::not_found("bank transaction", transaction_id))?;
    Ok((statement, rows, index))
}

/// Marks a transaction as deliberately excluded from the books.
pub fn ignore_transaction(store: &dyn Store, transaction_id: Id) -> Result<BankTransaction> {
    let (statement, mut rows, index) = load_for_review(store, transaction_id)?;
    match rows[index].status {
        TransactionStatus::Ignored => return Ok(rows[index].clone()),
        TransactionStatus::Matched | TransactionStatus::Processed => {
            return Err(RentbookError::Conflict(format!(
                "transaction {transaction_id} is already posted to the ledger"
            )))
        }
        _ => {}
    }
    let txn = &mut rows[index];
    txn.status = TransactionStatus::Ignored;
    txn.category_id = None;
    txn.reconciled = false;
    txn.review_reason = None;
    let txn = txn.clone();

    store.commit_classification(&ClassificationCommit {
        statement_reconciled: statement_reconciled(&statement, &rows),
        transaction: txn.clone(),
        payment: None,
        ledger_entry: None,
    })?;
    info!(transaction_id, "transaction ignored");
    Ok(txn)
}

/// Applies a reviewer's category choice to an unsettled transaction.
pub fn assign_category(store: &dyn Store, transaction_id: Id, category_id: Id) -> Result<BankTransaction> {
    let (statement, mut rows, index) = load_for_review(store, transaction_id)?;
    if is_settled(rows[index].status) {
        return Err(RentbookError::Conflict(format!(
            "transaction {transaction_id} is already {}",
            rows[index].status
        )));
    }
    let category = store
        .category(category_id)?
        .filter(|c| c.user_id == statement.user_id)
        .ok_or_else(|| RentbookError::not_found("category", category_id))?;
    let date = rows[index].transaction_date;
    if let Some(year) = closed_tax_year_for(store, statement.user_id, date)? {
        return Err(RentbookError::Conflict(format!(
            "{date} falls in closed tax year {}",
            year.label
        )));
    }

    let txn = &mut rows[index];
    txn.status = TransactionStatus::Processed;
    txn.category_id = Some(category.id);
    txn.reconciled = true;
    txn.review_reason = None;
    let txn = txn.clone();

    store.commit_classification(&ClassificationCommit {
        statement_reconciled: statement_reconciled(&statement, &rows),
        ledger_entry: Some(ledger_entry_for(&statement, &txn, &category, txn.property_id)),
        transaction: txn.clone(),
        payment: None,
    })?;
    info!(transaction_id, category_id, "category assigned");
    Ok(txn)
}

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{RentbookError, Result};
use crate::models::{BankAccount, BankStatement, BankTransaction, EntryType, Id, TransactionStatus};
use crate::store::{require, Store};

/// Declared balances within this tolerance count as verified.
pub const BALANCE_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Inputs and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub account_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub starting_balance: f64,
    pub ending_balance: f64,
}

/// One record as it came off the statement. The date stays textual so a bad
/// value is reported per record instead of failing the whole statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub is_deposit: bool,
    pub balance: Option<f64>,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceMismatch {
    pub declared_ending: f64,
    pub computed_ending: f64,
}

impl BalanceMismatch {
    pub fn difference(&self) -> f64 {
        self.computed_ending - self.declared_ending
    }

    pub fn to_error(&self) -> RentbookError {
        RentbookError::Validation(format!(
            "statement balances do not reconcile: declared ending {:.2}, computed {:.2}",
            self.declared_ending, self.computed_ending
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub statement: BankStatement,
    pub transactions: Vec<BankTransaction>,
    pub errors: Vec<RecordError>,
    pub balance_issue: Option<BalanceMismatch>,
}

// ---------------------------------------------------------------------------
// Extraction seam
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("extraction service failed: {0}")]
    Service(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTransaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub category: Option<String>,
    pub reference: Option<String>,
    /// Running balance after this row, when the document prints one.
    pub balance: Option<f64>,
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedStatement {
    pub document_type: String,
    pub bank_name: Option<String>,
    pub account_number_last4: Option<String>,
    pub statement_period: Option<StatementPeriod>,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    pub transactions: Vec<ExtractedTransaction>,
}

/// Turns an uploaded document into structured statement data.
pub trait StatementExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        file_type: &str,
    ) -> std::result::Result<ExtractedStatement, ExtractionError>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parses a statement amount: `$1,234.50`, `-12`, `(45.00)`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

/// Accepts `YYYY-MM-DD` and `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn validate_metadata(meta: &StatementMetadata) -> Result<()> {
    if meta.end_date < meta.start_date {
        return Err(RentbookError::Validation(format!(
            "statement period ends ({}) before it starts ({})",
            meta.end_date, meta.start_date
        )));
    }
    if !meta.starting_balance.is_finite() || !meta.ending_balance.is_finite() {
        return Err(RentbookError::Validation(
            "statement balances must be finite numbers".to_string(),
        ));
    }
    Ok(())
}

fn to_bank_transaction(
    statement: &BankStatement,
    raw: &RawTransaction,
) -> std::result::Result<BankTransaction, String> {
    let date = parse_date(&raw.date).ok_or_else(|| format!("unparseable date {:?}", raw.date))?;
    let description = raw.description.trim();
    if description.is_empty() {
        return Err("blank description".to_string());
    }
    if !raw.amount.is_finite() {
        return Err(format!("amount is not a finite number: {}", raw.amount));
    }
    let amount = if raw.is_deposit {
        raw.amount.abs()
    } else {
        -raw.amount.abs()
    };
    Ok(BankTransaction {
        id: 0,
        statement_id: statement.id,
        account_id: statement.account_id,
        transaction_date: date,
        description: description.to_string(),
        amount,
        is_deposit: raw.is_deposit,
        balance: raw.balance.filter(|b| b.is_finite()),
        reference: raw.reference.clone(),
        counterparty: raw.counterparty.clone(),
        status: TransactionStatus::Unprocessed,
        category_id: None,
        tenant_id: None,
        payment_id: None,
        property_id: None,
        reconciled: false,
        review_reason: None,
    })
}

fn new_statement(
    account: &BankAccount,
    meta: &StatementMetadata,
    checksum: Option<String>,
    source_name: Option<String>,
) -> BankStatement {
    BankStatement {
        id: 0,
        user_id: account.user_id,
        account_id: account.id,
        start_date: meta.start_date,
        end_date: meta.end_date,
        starting_balance: meta.starting_balance,
        ending_balance: meta.ending_balance,
        transaction_count: 0,
        processed: false,
        reconciled: false,
        balance_verified: false,
        processing_error: None,
        checksum,
        source_name,
        uploaded_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// ingest_statement
// ---------------------------------------------------------------------------

pub fn ingest_statement(
    store: &dyn Store,
    metadata: &StatementMetadata,
    raw: &[RawTransaction],
) -> Result<IntakeOutcome> {
    ingest(store, metadata, raw, None, None)
}

fn ingest(
    store: &dyn Store,
    metadata: &StatementMetadata,
    raw: &[RawTransaction],
    checksum: Option<String>,
    source_name: Option<String>,
) -> Result<IntakeOutcome> {
    let mut account = require(store.account(metadata.account_id)?, "bank account", metadata.account_id)?;
    validate_metadata(metadata)?;

    let statement = store.insert_statement(new_statement(&account, metadata, checksum, source_name))?;

    let mut rows = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for (index, record) in raw.iter().enumerate() {
        match to_bank_transaction(&statement, record) {
            Ok(row) => rows.push(row),
            Err(reason) => {
                warn!(statement_id = statement.id, index, %reason, "skipping malformed statement record");
                errors.push(RecordError { index, reason });
            }
        }
    }
    let transactions = store.insert_bank_transactions(rows)?;

    let net: f64 = transactions.iter().map(|t| t.amount).sum();
    let computed_ending = metadata.starting_balance + net;
    let balance_issue = if (computed_ending - metadata.ending_balance).abs() > BALANCE_TOLERANCE {
        let mismatch = BalanceMismatch {
            declared_ending: metadata.ending_balance,
            computed_ending,
        };
        warn!(
            statement_id = statement.id,
            difference = mismatch.difference(),
            "statement balance check failed"
        );
        Some(mismatch)
    } else {
        None
    };

    store.mark_statement_processed(
        statement.id,
        transactions.len() as i64,
        balance_issue.is_none(),
    )?;

    account.balance = metadata.ending_balance;
    store.update_account(&account)?;

    let statement = require(store.statement(statement.id)?, "bank statement", statement.id)?;
    info!(
        statement_id = statement.id,
        account_id = account.id,
        imported = transactions.len(),
        skipped = errors.len(),
        balance_verified = statement.balance_verified,
        "statement ingested"
    );
    Ok(IntakeOutcome {
        statement,
        transactions,
        errors,
        balance_issue,
    })
}

// ---------------------------------------------------------------------------
// ingest_document
// ---------------------------------------------------------------------------

/// Upload path: checksum guard, external extraction, then `ingest_statement`.
/// A statement whose extraction failed does not hold its checksum, so the
/// same bytes can be uploaded again once the extractor recovers.
pub fn ingest_document(
    store: &dyn Store,
    account_id: Id,
    source_name: &str,
    bytes: &[u8],
    file_type: &str,
    extractor: &dyn StatementExtractor,
    today: NaiveDate,
) -> Result<IntakeOutcome> {
    let account = require(store.account(account_id)?, "bank account", account_id)?;

    let checksum = compute_checksum(bytes);
    if let Some(existing) = store.statement_by_checksum(account_id, &checksum)? {
        return Err(RentbookError::Conflict(format!(
            "{source_name} was already uploaded as statement {}",
            existing.id
        )));
    }

    let extracted = match extractor.extract(bytes, file_type) {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!(account_id, source = source_name, error = %e, "statement extraction failed");
            let meta = StatementMetadata {
                account_id,
                start_date: today,
                end_date: today,
                starting_balance: account.balance,
                ending_balance: account.balance,
            };
            let mut failed = new_statement(&account, &meta, Some(checksum), Some(source_name.to_string()));
            failed.processing_error = Some(e.to_string());
            let statement = store.insert_statement(failed)?;
            return Ok(IntakeOutcome {
                statement,
                transactions: Vec::new(),
                errors: Vec::new(),
                balance_issue: None,
            });
        }
    };

    let (metadata, raw) = statement_from_extraction(&account, &extracted, today);
    ingest(store, &metadata, &raw, Some(checksum), Some(source_name.to_string()))
}

/// Fills in what the document left out: the period from the transaction
/// dates, the opening balance from the account, the closing from the net.
pub fn statement_from_extraction(
    account: &BankAccount,
    extracted: &ExtractedStatement,
    today: NaiveDate,
) -> (StatementMetadata, Vec<RawTransaction>) {
    let raw: Vec<RawTransaction> = extracted
        .transactions
        .iter()
        .map(|t| RawTransaction {
            date: t.date.clone(),
            description: t.description.clone(),
            amount: t.amount.abs(),
            is_deposit: t.entry_type == EntryType::Income,
            balance: t.balance,
            reference: t.reference.clone(),
            counterparty: t.counterparty.clone(),
        })
        .collect();

    let (start_date, end_date) = match extracted.statement_period {
        Some(p) => (p.start, p.end),
        None => {
            let dates: Vec<NaiveDate> = raw.iter().filter_map(|r| parse_date(&r.date)).collect();
            (
                dates.iter().min().copied().unwrap_or(today),
                dates.iter().max().copied().unwrap_or(today),
            )
        }
    };

    let starting_balance = extracted.opening_balance.unwrap_or(account.balance);
    let ending_balance = extracted.closing_balance.unwrap_or_else(|| {
        let net: f64 = raw
            .iter()
            .filter(|r| r.amount.is_finite())
            .map(|r| if r.is_deposit { r.amount } else { -r.amount })
            .sum();
        starting_balance + net
    });

    (
        StatementMetadata {
            account_id: account.id,
            start_date,
            end_date,
            starting_balance,
            ending_balance,
        },
        raw,
    )
}

// ---------------------------------------------------------------------------
// CSV extractor
// ---------------------------------------------------------------------------

/// Reads a `Date,Description,Amount[,Balance,Reference,Counterparty]` export.
/// Column order is taken from the header; names match case-insensitively.
pub struct CsvExtractor;

struct CsvColumns {
    date: usize,
    description: usize,
    amount: usize,
    balance: Option<usize>,
    reference: Option<usize>,
    counterparty: Option<usize>,
}

impl CsvColumns {
    fn from_header(header: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        Some(Self {
            date: find("date")?,
            description: find("description")?,
            amount: find("amount")?,
            balance: find("balance"),
            reference: find("reference"),
            counterparty: find("counterparty"),
        })
    }
}

impl StatementExtractor for CsvExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        file_type: &str,
    ) -> std::result::Result<ExtractedStatement, ExtractionError> {
        if !file_type.trim_start_matches('.').eq_ignore_ascii_case("csv") {
            return Err(ExtractionError::Unsupported(file_type.to_string()));
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);
        let header = rdr
            .headers()
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?
            .clone();
        let cols = CsvColumns::from_header(&header).ok_or_else(|| {
            ExtractionError::Malformed("expected Date, Description and Amount columns".to_string())
        })?;

        let mut transactions = Vec::new();
        let mut first_balance: Option<(f64, f64)> = None;
        let mut last_balance = None;
        for result in rdr.records() {
            let record = result.map_err(|e| ExtractionError::Malformed(e.to_string()))?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let field = |i: usize| record.get(i).unwrap_or("").trim();
            let optional = |col: Option<usize>| {
                col.map(|i| field(i).to_string()).filter(|s| !s.is_empty())
            };
            // Unparseable amounts travel on as NaN so intake reports the record.
            let amount = parse_amount(field(cols.amount)).unwrap_or(f64::NAN);
            let balance = cols.balance.and_then(|i| parse_amount(field(i)));
            if let Some(b) = balance {
                if first_balance.is_none() && amount.is_finite() {
                    first_balance = Some((b, amount));
                }
                last_balance = Some(b);
            }
            transactions.push(ExtractedTransaction {
                date: field(cols.date).to_string(),
                description: field(cols.description).to_string(),
                amount,
                entry_type: if amount < 0.0 {
                    EntryType::Expense
                } else {
                    EntryType::Income
                },
                category: None,
                reference: optional(cols.reference),
                balance,
                counterparty: optional(cols.counterparty),
            });
        }

        Ok(ExtractedStatement {
            document_type: "bank_statement".to_string(),
            bank_name: None,
            account_number_last4: None,
            statement_period: None,
            opening_balance: first_balance.map(|(balance, amount)| balance - amount),
            closing_balance: last_balance,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BankAccount;
    use crate::testutil::{add_account, d, test_store};

    fn raw(date: &str, description: &str, amount: f64, is_deposit: bool) -> RawTransaction {
        RawTransaction {
            date: date.into(),
            description: description.into(),
            amount,
            is_deposit,
            balance: None,
            reference: None,
            counterparty: None,
        }
    }

    fn march(account: &BankAccount, start: f64, end: f64) -> StatementMetadata {
        StatementMetadata {
            account_id: account.id,
            start_date: d("2024-03-01"),
            end_date: d("2024-03-31"),
            starting_balance: start,
            ending_balance: end,
        }
    }

    fn today() -> NaiveDate {
        d("2024-04-10")
    }

    struct FailingExtractor;

    impl StatementExtractor for FailingExtractor {
        fn extract(&self, _: &[u8], _: &str) -> std::result::Result<ExtractedStatement, ExtractionError> {
            Err(ExtractionError::Service("timeout".into()))
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("-42.10"), Some(-42.10));
        assert_eq!(parse_amount("(50.00)"), Some(-50.0));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-03-05"), Some(d("2024-03-05")));
        assert_eq!(parse_date("03/05/2024"), Some(d("2024-03-05")));
        assert_eq!(parse_date("13/45/2024"), None);
    }

    #[test]
    fn test_ingest_persists_rows_and_marks_processed() {
        let store = test_store();
        let account = add_account(&store, 1, 1000.0);
        let outcome = ingest_statement(
            &store,
            &march(&account, 1000.0, 1850.0),
            &[
                raw("2024-03-02", "RENT MARA QUINN", 950.0, true),
                raw("2024-03-10", "HARDWARE STORE", 100.0, false),
            ],
        )
        .unwrap();

        assert!(outcome.errors.is_empty());
        assert!(outcome.balance_issue.is_none());
        assert!(outcome.statement.processed);
        assert!(outcome.statement.balance_verified);
        assert_eq!(outcome.statement.transaction_count, 2);
        assert_eq!(outcome.transactions[1].amount, -100.0);
        assert!(outcome
            .transactions
            .iter()
            .all(|t| t.status == TransactionStatus::Unprocessed && !t.reconciled));
        assert_eq!(store.account(account.id).unwrap().unwrap().balance, 1850.0);
    }

    #[test]
    fn test_malformed_record_is_reported_not_dropped() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let outcome = ingest_statement(
            &store,
            &march(&account, 0.0, 950.0),
            &[
                raw("2024-03-02", "RENT", 950.0, true),
                raw("not-a-date", "MYSTERY", 5.0, true),
                raw("2024-03-04", "   ", 5.0, true),
            ],
        )
        .unwrap();
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(
            outcome.errors.iter().map(|e| e.index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(outcome.statement.transaction_count, 1);
    }

    #[test]
    fn test_balance_mismatch_keeps_rows_but_blocks_reconciliation() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let outcome = ingest_statement(
            &store,
            &march(&account, 0.0, 500.0),
            &[raw("2024-03-02", "RENT", 950.0, true)],
        )
        .unwrap();
        let issue = outcome.balance_issue.unwrap();
        assert_eq!(issue.computed_ending, 950.0);
        assert!(matches!(issue.to_error(), RentbookError::Validation(_)));
        assert_eq!(outcome.transactions.len(), 1);
        assert!(outcome.statement.processed);
        assert!(!outcome.statement.balance_verified);
    }

    #[test]
    fn test_invalid_period_persists_nothing() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let mut meta = march(&account, 0.0, 0.0);
        meta.end_date = d("2024-02-01");
        let err = ingest_statement(&store, &meta, &[]).unwrap_err();
        assert!(matches!(err, RentbookError::Validation(_)));
        assert!(store.statements_for_user(1).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let store = test_store();
        let meta = StatementMetadata {
            account_id: 77,
            start_date: d("2024-03-01"),
            end_date: d("2024-03-31"),
            starting_balance: 0.0,
            ending_balance: 0.0,
        };
        assert!(matches!(
            ingest_statement(&store, &meta, &[]),
            Err(RentbookError::NotFound { entity: "bank account", id: 77 })
        ));
    }

    #[test]
    fn test_csv_document_ingest_and_duplicate_guard() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let csv = b"Date,Description,Amount,Balance\n\
            03/02/2024,RENT MARA QUINN,950.00,2950.00\n\
            03/09/2024,CITY WATER UTILITIES,(80.25),2869.75\n";
        let outcome =
            ingest_document(&store, account.id, "march.csv", csv, "csv", &CsvExtractor, today()).unwrap();
        assert_eq!(outcome.statement.start_date, d("2024-03-02"));
        assert_eq!(outcome.statement.end_date, d("2024-03-09"));
        assert_eq!(outcome.statement.starting_balance, 2000.0);
        assert_eq!(outcome.statement.ending_balance, 2869.75);
        assert!(outcome.statement.balance_verified);
        assert_eq!(outcome.statement.source_name.as_deref(), Some("march.csv"));
        assert!(!outcome.transactions[1].is_deposit);

        let err = ingest_document(&store, account.id, "again.csv", csv, "csv", &CsvExtractor, today())
            .unwrap_err();
        assert!(matches!(err, RentbookError::Conflict(_)));
        assert_eq!(store.statements_for_user(1).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_closing_balance_uses_net() {
        let account = BankAccount {
            id: 3,
            user_id: 1,
            name: "Operating".into(),
            balance: 100.0,
            currency: "USD".into(),
            is_default: true,
        };
        let extracted = ExtractedStatement {
            document_type: "bank_statement".into(),
            bank_name: Some("First Local".into()),
            account_number_last4: Some("4321".into()),
            statement_period: None,
            opening_balance: None,
            closing_balance: None,
            transactions: vec![
                ExtractedTransaction {
                    date: "2024-04-03".into(),
                    description: "RENT".into(),
                    amount: 800.0,
                    entry_type: EntryType::Income,
                    category: None,
                    reference: None,
                    balance: None,
                    counterparty: None,
                },
                ExtractedTransaction {
                    date: "2024-04-20".into(),
                    description: "PLUMBER".into(),
                    amount: -150.0,
                    entry_type: EntryType::Expense,
                    category: Some("Maintenance".into()),
                    reference: None,
                    balance: None,
                    counterparty: None,
                },
            ],
        };
        let (meta, raw) = statement_from_extraction(&account, &extracted, today());
        assert_eq!(meta.starting_balance, 100.0);
        assert_eq!(meta.ending_balance, 750.0);
        assert_eq!(meta.start_date, d("2024-04-03"));
        assert_eq!(meta.end_date, d("2024-04-20"));
        assert!(!raw[1].is_deposit);
    }

    #[test]
    fn test_extractor_failure_records_processing_error() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let outcome = ingest_document(
            &store,
            account.id,
            "scan.pdf",
            b"%PDF",
            "pdf",
            &FailingExtractor,
            today(),
        )
        .unwrap();
        assert!(!outcome.statement.processed);
        assert_eq!(outcome.statement.start_date, today());
        assert_eq!(outcome.statement.end_date, today());
        assert!(outcome
            .statement
            .processing_error
            .as_deref()
            .unwrap()
            .contains("timeout"));
    }

    #[test]
    fn test_failed_upload_can_be_retried() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let csv = b"Date,Description,Amount\n2024-03-02,RENT,950.00\n";
        let failed =
            ingest_document(&store, account.id, "march.csv", csv, "csv", &FailingExtractor, today())
                .unwrap();
        assert!(failed.statement.processing_error.is_some());

        let retried =
            ingest_document(&store, account.id, "march.csv", csv, "csv", &CsvExtractor, today())
                .unwrap();
        assert!(retried.statement.processed);
        assert_ne!(retried.statement.id, failed.statement.id);
        assert_eq!(retried.transactions.len(), 1);

        let err = ingest_document(&store, account.id, "march.csv", csv, "csv", &CsvExtractor, today())
            .unwrap_err();
        assert!(matches!(err, RentbookError::Conflict(_)));
    }

    #[test]
    fn test_csv_carries_balance_reference_and_counterparty() {
        let store = test_store();
        let account = add_account(&store, 1, 0.0);
        let csv = b"Date,Description,Amount,Balance,Reference,Counterparty\n\
            2024-03-02,ZELLE PAYMENT,950.00,950.00,ZX-1042,Mara Quinn\n\
            2024-03-04,HARDWARE,-40.00,910.00,,\n";
        let outcome =
            ingest_document(&store, account.id, "march.csv", csv, "csv", &CsvExtractor, today()).unwrap();
        let rows = store.bank_transactions_for_statement(outcome.statement.id).unwrap();
        assert_eq!(rows[0].counterparty.as_deref(), Some("Mara Quinn"));
        assert_eq!(rows[0].reference.as_deref(), Some("ZX-1042"));
        assert_eq!(rows[0].balance, Some(950.0));
        assert_eq!(rows[1].balance, Some(910.0));
        assert_eq!(rows[1].counterparty, None);
        assert_eq!(rows[1].reference, None);
    }

    #[test]
    fn test_csv_extractor_rejects_other_types() {
        assert!(matches!(
            CsvExtractor.extract(b"", "xlsx"),
            Err(ExtractionError::Unsupported(_))
        ));
        assert!(matches!(
            CsvExtractor.extract(b"When,What\n1,2\n", "csv"),
            Err(ExtractionError::Malformed(_))
        ));
    }
}

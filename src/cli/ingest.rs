use std::path::Path;

use colored::Colorize;

use rentbook::error::Result;
use rentbook::fmt::money;
use rentbook::intake::CsvExtractor;
use rentbook::models::Id;

use super::Session;

pub fn run(session: &Session, file: &str, account_id: Id) -> Result<()> {
    let path = Path::new(file);
    let bytes = std::fs::read(path)?;
    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string());

    let outcome = session.pipeline.ingest_document(
        account_id,
        &source_name,
        &bytes,
        &file_type,
        &CsvExtractor,
    )?;
    let statement = &outcome.statement;

    if let Some(reason) = &statement.processing_error {
        println!("{} {reason}", "Could not read statement:".red().bold());
        println!("Recorded as statement {} so the upload is not retried.", statement.id);
        return Ok(());
    }

    println!(
        "Statement {}: {} to {}, {} imported, {} skipped",
        statement.id,
        statement.start_date,
        statement.end_date,
        outcome.transactions.len(),
        outcome.errors.len()
    );
    for e in &outcome.errors {
        println!("  row {}: {}", e.index + 1, e.reason);
    }
    match &outcome.balance_issue {
        None => println!("Balances {}", "verified".green()),
        Some(m) => println!(
            "{} declared ending {}, computed {} (off by {})",
            "Balance mismatch:".yellow().bold(),
            money(m.declared_ending),
            money(m.computed_ending),
            money(m.difference())
        ),
    }
    println!("Run `rentbook classify {}` to match it against rent.", statement.id);
    Ok(())
}

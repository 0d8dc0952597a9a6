use colored::Colorize;

use rentbook::classifier::ClassifyReport;
use rentbook::error::Result;
use rentbook::models::Id;

use super::Session;

pub(crate) fn print_report(report: &ClassifyReport) {
    println!(
        "{} matched to rent, {} categorized, {} need review, {} already settled",
        report.matched, report.processed, report.needs_review, report.skipped
    );
    for e in &report.errors {
        println!("  {} transaction {}: {}", "error".red(), e.transaction_id, e.reason);
    }
}

pub fn run(session: &Session, statement: Option<Id>) -> Result<()> {
    let report = match statement {
        Some(id) => session.pipeline.classify(id)?,
        None => session.pipeline.classify_user(session.user_id)?,
    };
    print_report(&report);
    if report.needs_review > 0 {
        println!("Run `rentbook review list` to decide the rest.");
    }
    Ok(())
}

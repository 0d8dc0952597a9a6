//! Rent reconciliation for small landlords: bank statement intake,
//! classification against expected rent, a ledger with budgets and tax
//! years, late-payer detection and reminders.

pub mod classifier;
pub mod db;
pub mod detector;
pub mod error;
pub mod fmt;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod reminders;
pub mod service;
pub mod settings;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testutil;

//! A unified view over the two kinds of ledger entry.
//!
//! One-time transactions and recurring templates are separate tables with
//! separate lifecycles, but callers that render or export an account want to
//! treat them uniformly. [LedgerEntry] is that view: a sum type over the two
//! models with a common amount/date surface and a tagged JSON record form.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use time::Date;

use crate::{
    Error,
    database_id::AccountId,
    recurring::{RecurringTemplate, get_account_templates},
    transaction::{Transaction, get_account_transactions},
};

/// Either of the two kinds of entry an account's ledger can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    /// A one-time transaction (manual or generated).
    Single(Transaction),
    /// A recurring template, representing its future occurrences.
    Recurring(RecurringTemplate),
}

impl LedgerEntry {
    /// The signed amount of the entry (per occurrence, for a template).
    pub fn amount(&self) -> Decimal {
        match self {
            LedgerEntry::Single(transaction) => transaction.amount,
            LedgerEntry::Recurring(template) => template.amount,
        }
    }

    /// The date the entry is anchored at: the occurrence date for a
    /// transaction, the start date for a template.
    pub fn date(&self) -> Date {
        match self {
            LedgerEntry::Single(transaction) => transaction.date,
            LedgerEntry::Recurring(template) => template.start_date,
        }
    }

    /// Render the entry as a tagged JSON record.
    ///
    /// Single transactions carry `"type": "single"`; templates carry
    /// `"type": "recurring"` plus their schedule state, with an unbounded
    /// cap written as `-1`.
    pub fn to_record(&self) -> Value {
        match self {
            LedgerEntry::Single(transaction) => json!({
                "date": transaction.date.to_string(),
                "vendor": transaction.vendor,
                "category": transaction.category,
                "amount": transaction.amount.to_string(),
                "notes": transaction.notes,
                "type": "single",
            }),
            LedgerEntry::Recurring(template) => json!({
                "start": template.start_date.to_string(),
                "vendor": template.vendor,
                "category": template.category,
                "amount": template.amount.to_string(),
                "notes": template.notes,
                "next": template.next_due_date.to_string(),
                "frequency": template.frequency_days,
                "number": template.total_occurrences.map_or(-1, i64::from),
                "type": "recurring",
            }),
        }
    }
}

/// Retrieve every entry in an account's ledger, oldest first.
///
/// Transactions sort by their occurrence date and templates by their start
/// date; within one date, transactions come before templates.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_ledger(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<LedgerEntry>, Error> {
    let transactions = get_account_transactions(account_id, connection)?;
    let templates = get_account_templates(account_id, connection)?;

    let mut entries: Vec<LedgerEntry> = transactions
        .into_iter()
        .map(LedgerEntry::Single)
        .chain(templates.into_iter().map(LedgerEntry::Recurring))
        .collect();

    entries.sort_by_key(|entry| {
        let kind = match entry {
            LedgerEntry::Single(_) => 0,
            LedgerEntry::Recurring(_) => 1,
        };
        (entry.date(), kind)
    });

    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================

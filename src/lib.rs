//! Balancebook tracks bank-account balances derived from two kinds of ledger
//! entries: one-time transactions and recurring templates that generate
//! one-time transactions over time.
//!
//! The interesting parts live in [recurring]: the occurrence generator walks
//! a template's due dates up to a reference date and materialises each one as
//! a linked transaction, and the retraction engine removes generated
//! transactions again when a template's occurrence cap is reduced. Both keep
//! the invariant that an account's balance equals the sum of its surviving
//! transaction amounts.
//!
//! All state lives in SQLite; operations are plain functions over a
//! [rusqlite::Connection] and every multi-step unit runs inside a single SQL
//! transaction so a failure partway cannot leave the balance and the
//! transaction history disagreeing.

#![warn(missing_docs)]

pub mod account;
mod database_id;
mod db;
pub mod entry;
mod money;
pub mod recurring;
pub mod transaction;

pub use database_id::{AccountId, DatabaseId, TemplateId, TransactionId};
pub use db::initialize as initialize_db;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A recurring template was given a non-positive number of days between
    /// occurrences.
    ///
    /// The occurrence generator relies on the due date strictly increasing
    /// each iteration, so a zero or negative frequency is rejected before it
    /// ever reaches the generator.
    #[error("frequency must be a positive number of days, got {0}")]
    InvalidFrequency(i64),

    /// A recurring template was given a bounded occurrence cap of zero.
    ///
    /// A template that should never produce occurrences is not a valid
    /// template; use an ordinary transaction instead.
    #[error("a bounded occurrence cap must be at least 1")]
    InvalidOccurrenceCap,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The specified account name already exists in the database.
    #[error("the account \"{0}\" already exists in the database")]
    DuplicateAccountName(String),

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete an account that does not exist
    #[error("tried to delete an account that is not in the database")]
    DeleteMissingAccount,

    /// Tried to update a recurring template that does not exist
    #[error("tried to update a recurring template that is not in the database")]
    UpdateMissingTemplate,

    /// Tried to delete a recurring template that does not exist
    #[error("tried to delete a recurring template that is not in the database")]
    DeleteMissingTemplate,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

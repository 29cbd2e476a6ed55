//! Defines the core data model and database operations for one-time
//! transactions.
//!
//! Creating, deleting and editing a transaction also applies its amount to
//! the owning account's balance, in the same SQL transaction, so the two can
//! never be observed disagreeing.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    account::{adjust_balance, apply_to_balance, reverse_from_balance},
    database_id::{AccountId, TemplateId, TransactionId},
    money::decimal_from_row,
};

// ============================================================================
// MODELS
// ============================================================================

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The ID of the account the transaction belongs to.
    pub account_id: AccountId,
    /// When the transaction happened.
    pub date: Date,
    /// Who the money went to or came from.
    pub vendor: String,
    /// The category of the transaction, e.g. "Groceries", "Rent".
    pub category: String,
    /// The amount of money spent or earned in this transaction.
    ///
    /// Positive values represent income, negative values represent expenses,
    /// following standard accounting conventions.
    pub amount: Decimal,
    /// Free-form notes about the transaction.
    pub notes: String,
    /// The ID of the recurring template that generated this transaction.
    ///
    /// - `Some(id)` - the transaction was produced by the occurrence
    ///   generator and may be retracted when the template's cap shrinks.
    /// - `None` - the transaction was entered manually.
    pub source_template_id: Option<TemplateId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        account_id: AccountId,
        amount: Decimal,
        date: Date,
        vendor: &str,
    ) -> TransactionBuilder {
        TransactionBuilder {
            account_id,
            amount,
            date,
            vendor: vendor.to_owned(),
            category: String::new(),
            notes: String::new(),
            source_template_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// Optional fields default to empty; pass the builder to
/// [create_transaction] to persist it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBuilder {
    /// The ID of the account the transaction will belong to.
    pub account_id: AccountId,
    /// The monetary amount of the transaction.
    pub amount: Decimal,
    /// The date when the transaction occurred.
    pub date: Date,
    /// Who the money went to or came from.
    pub vendor: String,
    /// The category of the transaction.
    pub category: String,
    /// Free-form notes about the transaction.
    pub notes: String,
    /// The recurring template that generated this transaction, if any.
    pub source_template_id: Option<TemplateId>,
}

impl TransactionBuilder {
    /// Set the category for the transaction.
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    /// Set the notes for the transaction.
    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_owned();
        self
    }

    /// Mark the transaction as generated by the recurring template
    /// `template_id`.
    pub fn source_template(mut self, template_id: TemplateId) -> Self {
        self.source_template_id = Some(template_id);
        self
    }
}

/// A field-level update to an existing transaction.
///
/// Fields left as `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// Replacement date.
    pub date: Option<Date>,
    /// Replacement vendor.
    pub vendor: Option<String>,
    /// Replacement category.
    pub category: Option<String>,
    /// Replacement amount. The difference is applied to the account balance.
    pub amount: Option<Decimal>,
    /// Replacement notes.
    pub notes: Option<String>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                vendor TEXT NOT NULL,
                category TEXT NOT NULL,
                amount TEXT NOT NULL,
                notes TEXT NOT NULL,
                source_template_id INTEGER,
                FOREIGN KEY(account_id) REFERENCES account(id) ON DELETE CASCADE,
                FOREIGN KEY(source_template_id) REFERENCES recurring_template(id) ON DELETE SET NULL
                )",
        (),
    )?;

    // Covers the account history and ledger recalculation queries.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account_date ON \"transaction\"(account_id, date);",
        (),
    )?;

    // Covers the retraction engine's cutoff scan.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_template_date ON \"transaction\"(source_template_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Transaction].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let account_id = row.get(1)?;
    let date = row.get(2)?;
    let vendor = row.get(3)?;
    let category = row.get(4)?;
    let amount = decimal_from_row(row, 5)?;
    let notes = row.get(6)?;
    let source_template_id = row.get(7)?;

    Ok(Transaction {
        id,
        account_id,
        date,
        vendor,
        category,
        amount,
        notes,
        source_template_id,
    })
}

/// Create a new transaction in the database from a builder and apply its
/// amount to the owning account's balance.
///
/// Both happen in a single SQL transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the builder's account or source template does not
///   exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let tx = connection.unchecked_transaction()?;
    let transaction = insert_transaction(builder, &tx)?;
    tx.commit()?;

    Ok(transaction)
}

/// Insert a transaction and apply its amount to the balance, without opening
/// an SQL transaction. The caller is responsible for atomicity.
pub(crate) fn insert_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (account_id, date, vendor, category, amount, notes, source_template_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id, account_id, date, vendor, category, amount, notes, source_template_id",
        )?
        .query_row(
            (
                builder.account_id,
                builder.date,
                &builder.vendor,
                &builder.category,
                builder.amount.to_string(),
                &builder.notes,
                builder.source_template_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    apply_to_balance(transaction.account_id, transaction.amount, connection)?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, account_id, date, vendor, category, amount, notes, source_template_id
             FROM \"transaction\" WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Retrieve all of an account's transactions, newest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_account_transactions(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, date, vendor, category, amount, notes, source_template_id
             FROM \"transaction\" WHERE account_id = :account_id
             ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":account_id", &account_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the transactions generated by a template, oldest first.
pub(crate) fn get_linked_transactions(
    template_id: TemplateId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, date, vendor, category, amount, notes, source_template_id
             FROM \"transaction\" WHERE source_template_id = :template_id
             ORDER BY date ASC, id ASC",
        )?
        .query_map(&[(":template_id", &template_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the transactions generated by a template that occur strictly
/// after `cutoff_date`, oldest first.
pub(crate) fn get_linked_transactions_after(
    template_id: TemplateId,
    cutoff_date: Date,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, date, vendor, category, amount, notes, source_template_id
             FROM \"transaction\"
             WHERE source_template_id = :template_id AND date > :cutoff_date
             ORDER BY date ASC, id ASC",
        )?
        .query_map(
            &[
                (":template_id", &template_id as &dyn rusqlite::ToSql),
                (":cutoff_date", &cutoff_date),
            ],
            map_transaction_row,
        )?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Count the transactions still linked to a template.
pub(crate) fn count_linked_transactions(
    template_id: TemplateId,
    connection: &Connection,
) -> Result<u32, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM \"transaction\" WHERE source_template_id = ?1",
            (template_id,),
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Re-insert a transaction from a snapshot under a freshly created account,
/// without touching the balance (the snapshot carries the balance as a
/// whole). `source_template_id` must already be remapped to the new template
/// ids.
pub(crate) fn restore_transaction(
    transaction: &Transaction,
    account_id: AccountId,
    source_template_id: Option<TemplateId>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let restored = connection
        .prepare(
            "INSERT INTO \"transaction\" (account_id, date, vendor, category, amount, notes, source_template_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id, account_id, date, vendor, category, amount, notes, source_template_id",
        )?
        .query_row(
            (
                account_id,
                transaction.date,
                &transaction.vendor,
                &transaction.category,
                transaction.amount.to_string(),
                &transaction.notes,
                source_template_id,
            ),
            map_transaction_row,
        )?;

    Ok(restored)
}

/// Delete a transaction and reverse its amount from the owning account's
/// balance, in a single SQL transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransaction] if `id` does not refer to a valid
///   transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_transaction(id: TransactionId, connection: &Connection) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    let transaction = get_transaction(id, &tx).map_err(|error| match error {
        Error::NotFound => Error::DeleteMissingTransaction,
        error => error,
    })?;

    reverse_from_balance(transaction.account_id, transaction.amount, &tx)?;
    tx.execute("DELETE FROM \"transaction\" WHERE id = ?1", (id,))?;

    tx.commit()?;

    Ok(())
}

/// Apply a field-level update to a transaction.
///
/// If the amount changes, the difference is applied to the owning account's
/// balance in the same SQL transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a valid
///   transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let tx = connection.unchecked_transaction()?;

    let existing = get_transaction(id, &tx).map_err(|error| match error {
        Error::NotFound => Error::UpdateMissingTransaction,
        error => error,
    })?;

    let date = update.date.unwrap_or(existing.date);
    let vendor = update.vendor.unwrap_or(existing.vendor);
    let category = update.category.unwrap_or(existing.category);
    let amount = update.amount.unwrap_or(existing.amount);
    let notes = update.notes.unwrap_or(existing.notes);

    if amount != existing.amount {
        adjust_balance(existing.account_id, existing.amount, amount, &tx)?;
    }

    let transaction = tx
        .prepare(
            "UPDATE \"transaction\"
             SET date = ?1, vendor = ?2, category = ?3, amount = ?4, notes = ?5
             WHERE id = ?6
             RETURNING id, account_id, date, vendor, category, amount, notes, source_template_id",
        )?
        .query_row(
            (date, &vendor, &category, amount.to_string(), &notes, id),
            map_transaction_row,
        )?;

    tx.commit()?;

    Ok(transaction)
}

// ============================================================================
// TESTS
// ============================================================================

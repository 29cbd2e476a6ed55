//! Defines the core data model and database queries for bank accounts.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, database_id::AccountId, money::decimal_from_row};

/// A bank account and its authoritative balance.
///
/// The balance is maintained incrementally by the ledger functions
/// ([apply_to_balance](super::apply_to_balance) and friends) so that it
/// always equals the sum of the amounts of the account's transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The ID of the account.
    pub id: AccountId,
    /// The display name of the account, e.g. "StarBank 0101".
    pub name: String,
    /// The amount of money currently in the account.
    pub balance: Decimal,
}

/// Create the account table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                balance TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Account].
pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let name = row.get(1)?;
    let balance = decimal_from_row(row, 2)?;

    Ok(Account { id, name, balance })
}

/// Create a new account with a zero balance.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateAccountName] if an account called `name` already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_account(name: &str, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("INSERT INTO account (name, balance) VALUES (?1, ?2) RETURNING id, name, balance")?
        .query_row((name, Decimal::ZERO.to_string()), map_account_row)
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateAccountName(name.to_owned()),
            error => error.into(),
        })
}

/// Retrieve an account from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    let account = connection
        .prepare("SELECT id, name, balance FROM account WHERE id = :id")?
        .query_row(&[(":id", &id)], map_account_row)?;

    Ok(account)
}

/// Retrieve every account in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_all_accounts(connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare("SELECT id, name, balance FROM account ORDER BY name")?
        .query_map([], map_account_row)?
        .map(|maybe_account| maybe_account.map_err(|error| error.into()))
        .collect()
}

/// Delete an account along with its transactions and recurring templates.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingAccount] if `id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_account(id: AccountId, connection: &Connection) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    get_account(id, &tx).map_err(|error| match error {
        Error::NotFound => Error::DeleteMissingAccount,
        error => error,
    })?;

    // Transactions reference templates, so they go first.
    tx.execute("DELETE FROM \"transaction\" WHERE account_id = ?1", (id,))?;
    tx.execute("DELETE FROM recurring_template WHERE account_id = ?1", (id,))?;
    tx.execute("DELETE FROM account WHERE id = ?1", (id,))?;

    tx.commit()?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod create_table_tests {
    use rusqlite::Connection;

    use super::create_account_table;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_account_table(&connection));
    }
}

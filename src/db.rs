/*! Database initialisation for the application's SQLite schema. */

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    account::create_account_table, recurring::create_template_table,
    transaction::create_transaction_table,
};

/// Create the application's tables if they do not exist.
///
/// Must be called once per connection before any other operation: it also
/// turns on foreign key enforcement, which SQLite leaves off by default.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let tx = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&tx)?;
    create_template_table(&tx)?;
    create_transaction_table(&tx)?;

    tx.commit()?;

    Ok(())
}

#[cfg(test)]
mod initialize_tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), initialize(&connection));
    }

    #[test]
    fn is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        assert_eq!(Ok(()), initialize(&connection));
    }
}

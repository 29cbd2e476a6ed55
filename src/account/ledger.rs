//! The authoritative balance ledger for an account.
//!
//! Every mutation of a transaction row goes through one of these functions,
//! keeping the invariant that the stored balance equals the sum of the
//! account's transaction amounts. [recalculate_balance] re-derives the
//! balance from the full transaction history and is the repair path when
//! drift is detected; drift itself is logged, not treated as an error.

use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::{Error, database_id::AccountId, money::decimal_from_row};

/// Get the current balance of an account.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_balance(account_id: AccountId, connection: &Connection) -> Result<Decimal, Error> {
    let balance = connection
        .prepare("SELECT balance FROM account WHERE id = :id")?
        .query_row(&[(":id", &account_id)], |row| decimal_from_row(row, 0))?;

    Ok(balance)
}

/// Add `amount` to the account's balance. Used on transaction creation.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn apply_to_balance(
    account_id: AccountId,
    amount: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    let balance = get_balance(account_id, connection)?;

    set_balance(account_id, balance + amount, connection)
}

/// Subtract `amount` from the account's balance. Used on transaction deletion.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn reverse_from_balance(
    account_id: AccountId,
    amount: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    apply_to_balance(account_id, -amount, connection)
}

/// Apply the difference between a transaction's old and new amount to the
/// account's balance. Used on transaction edit.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn adjust_balance(
    account_id: AccountId,
    old_amount: Decimal,
    new_amount: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    apply_to_balance(account_id, new_amount - old_amount, connection)
}

/// Set the account's balance to the sum of all its transaction amounts and
/// return the new balance.
///
/// This is the audit/repair operation: decimal arithmetic makes the result
/// exactly equal to what incremental application would have produced, so any
/// difference from the stored balance is drift (e.g. a row edited outside
/// the application) and is logged before being repaired.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn recalculate_balance(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let tx = connection.unchecked_transaction()?;

    let stored = get_balance(account_id, &tx)?;

    let amounts = tx
        .prepare("SELECT amount FROM \"transaction\" WHERE account_id = :id")?
        .query_map(&[(":id", &account_id)], |row| decimal_from_row(row, 0))?
        .collect::<Result<Vec<Decimal>, _>>()?;
    let total: Decimal = amounts.into_iter().sum();

    if total != stored {
        tracing::warn!(
            "balance drift on account {account_id}: stored {stored}, history sums to {total}"
        );
    }

    set_balance(account_id, total, &tx)?;
    tx.commit()?;

    Ok(total)
}

pub(crate) fn set_balance(
    account_id: AccountId,
    balance: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_changed = connection.execute(
        "UPDATE account SET balance = ?1 WHERE id = ?2",
        (balance.to_string(), account_id),
    )?;

    if rows_changed == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod ledger_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        account::create_account,
        db::initialize,
        transaction::{Transaction, create_transaction},
    };

    use super::{
        adjust_balance, apply_to_balance, get_balance, recalculate_balance, reverse_from_balance,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn apply_then_reverse_round_trips() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();

        apply_to_balance(account.id, dec!(123.45), &conn).unwrap();
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(123.45)));

        reverse_from_balance(account.id, dec!(123.45), &conn).unwrap();
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(0.00)));
    }

    #[test]
    fn adjust_applies_the_delta() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        apply_to_balance(account.id, dec!(100.00), &conn).unwrap();

        adjust_balance(account.id, dec!(-45.00), dec!(-50.00), &conn).unwrap();

        assert_eq!(get_balance(account.id, &conn), Ok(dec!(95.00)));
    }

    #[test]
    fn apply_to_missing_account_fails() {
        let conn = get_test_connection();

        let result = apply_to_balance(42, dec!(1.00), &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn recalculate_matches_incremental_balance() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let today = date!(2025 - 06 - 01);

        // Amounts chosen to drift under binary floating point.
        for amount in [dec!(0.10), dec!(0.20), dec!(-0.30), dec!(1234.56)] {
            create_transaction(Transaction::build(account.id, amount, today, "Shop"), &conn)
                .unwrap();
        }
        let incremental = get_balance(account.id, &conn).unwrap();

        let recalculated = recalculate_balance(account.id, &conn).unwrap();

        assert_eq!(recalculated, incremental);
        assert_eq!(recalculated, dec!(1234.56));
    }

    #[test]
    fn recalculate_repairs_drift() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        create_transaction(
            Transaction::build(account.id, dec!(50.00), date!(2025 - 06 - 01), "Shop"),
            &conn,
        )
        .unwrap();

        // Corrupt the stored balance behind the ledger's back.
        conn.execute(
            "UPDATE account SET balance = '999.99' WHERE id = ?1",
            (account.id,),
        )
        .unwrap();

        let recalculated = recalculate_balance(account.id, &conn).unwrap();

        assert_eq!(recalculated, dec!(50.00));
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(50.00)));
    }
}

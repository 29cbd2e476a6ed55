//! Helpers for reading decimal amounts out of the database.
//!
//! SQLite has no decimal type, and REAL columns drift when many small
//! amounts are added incrementally. Amounts are therefore stored as their
//! canonical string form and parsed back on the way out, so recalculating a
//! balance from history produces a value bit-for-bit equal to applying each
//! transaction one at a time.

use std::str::FromStr;

use rusqlite::Row;
use rust_decimal::Decimal;

/// Parse the TEXT column at `index` as a [Decimal].
pub(crate) fn decimal_from_row(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    Decimal::from_str(&text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

#[cfg(test)]
mod decimal_from_row_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;

    use super::decimal_from_row;

    #[test]
    fn parses_stored_text() {
        let conn = Connection::open_in_memory().unwrap();

        let amount = conn
            .query_row("SELECT '-1234.56'", [], |row| decimal_from_row(row, 0))
            .unwrap();

        assert_eq!(amount, dec!(-1234.56));
    }

    #[test]
    fn rejects_garbage() {
        let conn = Connection::open_in_memory().unwrap();

        let result = conn.query_row("SELECT 'not a number'", [], |row| decimal_from_row(row, 0));

        assert!(result.is_err());
    }
}

//! Defines the core data model and database operations for recurring
//! templates.
//!
//! A template is a rule that produces one-time transactions at a fixed
//! interval, starting at `start_date`. `next_due_date` always points at the
//! next occurrence the generator has not yet produced, and `generated_count`
//! counts the occurrences produced so far, so the invariant
//! `next_due_date == start_date + frequency_days * generated_count` holds in
//! any consistent state.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Duration};

use crate::{
    Error,
    account::reverse_from_balance,
    database_id::{AccountId, TemplateId},
    money::decimal_from_row,
    recurring::retraction::{needs_retraction, retract_excess},
    transaction::get_linked_transactions,
};

// ============================================================================
// MODELS
// ============================================================================

/// The maximum number of occurrences a template may produce.
///
/// `None` means unbounded (the template keeps producing occurrences forever);
/// `Some(n)` caps the template at `n` occurrences in total.
pub type OccurrenceCap = Option<u32>;

/// A rule for transactions that repeat over time.
///
/// To create a new `RecurringTemplate`, use [RecurringTemplate::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    /// The ID of the template.
    pub id: TemplateId,
    /// The ID of the account the template belongs to.
    pub account_id: AccountId,
    /// The date of the first occurrence.
    pub start_date: Date,
    /// Who the money goes to or comes from.
    pub vendor: String,
    /// The category copied onto each generated transaction.
    pub category: String,
    /// The signed amount of each occurrence.
    pub amount: Decimal,
    /// Free-form notes, copied onto generated transactions with an
    /// auto-generation marker.
    pub notes: String,
    /// The date of the next not-yet-generated occurrence.
    pub next_due_date: Date,
    /// The number of days between occurrences. Always positive.
    pub frequency_days: i64,
    /// The occurrence cap, or `None` for unbounded.
    pub total_occurrences: OccurrenceCap,
    /// How many occurrences have been produced so far.
    pub generated_count: u32,
}

impl RecurringTemplate {
    /// Create a new recurring template.
    ///
    /// Shortcut for [RecurringTemplateBuilder] for discoverability.
    pub fn build(
        account_id: AccountId,
        amount: Decimal,
        start_date: Date,
        vendor: &str,
    ) -> RecurringTemplateBuilder {
        RecurringTemplateBuilder {
            account_id,
            amount,
            start_date,
            vendor: vendor.to_owned(),
            category: String::new(),
            notes: String::new(),
            frequency_days: 30,
            total_occurrences: None,
        }
    }

    /// The dates of the next not-yet-generated occurrences, up to `limit`.
    ///
    /// Does not mutate any state; bounded templates report at most the
    /// occurrences left under their cap.
    pub fn upcoming_dates(&self, limit: usize) -> Vec<Date> {
        let count = match self.total_occurrences {
            None => limit,
            Some(cap) => (cap.saturating_sub(self.generated_count) as usize).min(limit),
        };

        (0..count)
            .map(|i| self.next_due_date + Duration::days(self.frequency_days * i as i64))
            .collect()
    }
}

/// A builder for creating [RecurringTemplate] instances.
///
/// The frequency defaults to 30 days and the cap to unbounded. The first
/// occurrence is due on the start date itself, so `next_due_date` starts out
/// equal to `start_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTemplateBuilder {
    /// The ID of the account the template will belong to.
    pub account_id: AccountId,
    /// The signed amount of each occurrence.
    pub amount: Decimal,
    /// The date of the first occurrence.
    pub start_date: Date,
    /// Who the money goes to or comes from.
    pub vendor: String,
    /// The category copied onto each generated transaction.
    pub category: String,
    /// Free-form notes.
    pub notes: String,
    /// The number of days between occurrences.
    pub frequency_days: i64,
    /// The occurrence cap, or `None` for unbounded.
    pub total_occurrences: OccurrenceCap,
}

impl RecurringTemplateBuilder {
    /// Set the category for the template.
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    /// Set the notes for the template.
    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_owned();
        self
    }

    /// Set the number of days between occurrences.
    pub fn frequency_days(mut self, frequency_days: i64) -> Self {
        self.frequency_days = frequency_days;
        self
    }

    /// Set the occurrence cap.
    pub fn total_occurrences(mut self, cap: OccurrenceCap) -> Self {
        self.total_occurrences = cap;
        self
    }
}

/// A field-level update to an existing template.
///
/// Fields left as `None` are unchanged. Note the distinction for the cap:
/// `total_occurrences: None` leaves the cap alone, while
/// `total_occurrences: Some(None)` sets it to unbounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateUpdate {
    /// Replacement start date.
    pub start_date: Option<Date>,
    /// Replacement vendor.
    pub vendor: Option<String>,
    /// Replacement category.
    pub category: Option<String>,
    /// Replacement amount. Does not retroactively change generated
    /// transactions.
    pub amount: Option<Decimal>,
    /// Replacement notes.
    pub notes: Option<String>,
    /// Replacement next due date.
    pub next_due_date: Option<Date>,
    /// Replacement frequency.
    pub frequency_days: Option<i64>,
    /// Replacement occurrence cap.
    pub total_occurrences: Option<OccurrenceCap>,
}

/// How [delete_template] treats the transactions a template generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateDeletion {
    /// Delete the generated transactions too, reversing each amount from the
    /// account balance.
    Cascade,
    /// Keep the generated transactions as ordinary manual transactions,
    /// clearing their template link. The balance is untouched.
    Unlink,
}

fn validate(frequency_days: i64, cap: OccurrenceCap) -> Result<(), Error> {
    if frequency_days <= 0 {
        return Err(Error::InvalidFrequency(frequency_days));
    }

    if cap == Some(0) {
        return Err(Error::InvalidOccurrenceCap);
    }

    Ok(())
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the recurring template table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_template_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_template (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                start_date TEXT NOT NULL,
                vendor TEXT NOT NULL,
                category TEXT NOT NULL,
                amount TEXT NOT NULL,
                notes TEXT NOT NULL,
                next_due_date TEXT NOT NULL,
                frequency_days INTEGER NOT NULL,
                total_occurrences INTEGER,
                generated_count INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(account_id) REFERENCES account(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_template_account ON recurring_template(account_id);",
        (),
    )?;

    Ok(())
}

const TEMPLATE_COLUMNS: &str = "id, account_id, start_date, vendor, category, amount, notes, \
                                next_due_date, frequency_days, total_occurrences, generated_count";

/// Map a database row to a [RecurringTemplate].
pub fn map_template_row(row: &Row) -> Result<RecurringTemplate, rusqlite::Error> {
    let id = row.get(0)?;
    let account_id = row.get(1)?;
    let start_date = row.get(2)?;
    let vendor = row.get(3)?;
    let category = row.get(4)?;
    let amount = decimal_from_row(row, 5)?;
    let notes = row.get(6)?;
    let next_due_date = row.get(7)?;
    let frequency_days = row.get(8)?;
    let total_occurrences = row.get(9)?;
    let generated_count = row.get(10)?;

    Ok(RecurringTemplate {
        id,
        account_id,
        start_date,
        vendor,
        category,
        amount,
        notes,
        next_due_date,
        frequency_days,
        total_occurrences,
        generated_count,
    })
}

/// Create a new recurring template in the database from a builder.
///
/// The template starts with nothing generated: `next_due_date` is the start
/// date and `generated_count` is zero.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidFrequency] if the frequency is not positive,
/// - or [Error::InvalidOccurrenceCap] if a bounded cap of zero was given,
/// - or [Error::NotFound] if the builder's account does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_template(
    builder: RecurringTemplateBuilder,
    connection: &Connection,
) -> Result<RecurringTemplate, Error> {
    validate(builder.frequency_days, builder.total_occurrences)?;

    let template = connection
        .prepare(&format!(
            "INSERT INTO recurring_template
                 (account_id, start_date, vendor, category, amount, notes,
                  next_due_date, frequency_days, total_occurrences, generated_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
             RETURNING {TEMPLATE_COLUMNS}"
        ))?
        .query_row(
            (
                builder.account_id,
                builder.start_date,
                &builder.vendor,
                &builder.category,
                builder.amount.to_string(),
                &builder.notes,
                builder.start_date,
                builder.frequency_days,
                builder.total_occurrences,
            ),
            map_template_row,
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

    Ok(template)
}

/// Re-insert a template from a snapshot under a freshly created account,
/// preserving its generation state (`next_due_date` and `generated_count`)
/// so the generator resumes exactly where the exported account left off.
pub(crate) fn restore_template(
    template: &RecurringTemplate,
    account_id: AccountId,
    connection: &Connection,
) -> Result<RecurringTemplate, Error> {
    let restored = connection
        .prepare(&format!(
            "INSERT INTO recurring_template
                 (account_id, start_date, vendor, category, amount, notes,
                  next_due_date, frequency_days, total_occurrences, generated_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {TEMPLATE_COLUMNS}"
        ))?
        .query_row(
            (
                account_id,
                template.start_date,
                &template.vendor,
                &template.category,
                template.amount.to_string(),
                &template.notes,
                template.next_due_date,
                template.frequency_days,
                template.total_occurrences,
                template.generated_count,
            ),
            map_template_row,
        )?;

    Ok(restored)
}

/// Retrieve a recurring template from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid template,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_template(id: TemplateId, connection: &Connection) -> Result<RecurringTemplate, Error> {
    let template = connection
        .prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_template WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_template_row)?;

    Ok(template)
}

/// Retrieve all of an account's recurring templates.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_account_templates(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<RecurringTemplate>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_template
             WHERE account_id = :account_id ORDER BY id"
        ))?
        .query_map(&[(":account_id", &account_id)], map_template_row)?
        .map(|maybe_template| maybe_template.map_err(|error| error.into()))
        .collect()
}

/// Persist a template's generation cursor (`next_due_date` and
/// `generated_count`) after the generator or the retraction engine has moved
/// it.
pub(crate) fn store_generation_state(
    template: &RecurringTemplate,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_changed = connection.execute(
        "UPDATE recurring_template SET next_due_date = ?1, generated_count = ?2 WHERE id = ?3",
        (template.next_due_date, template.generated_count, template.id),
    )?;

    if rows_changed == 0 {
        return Err(Error::UpdateMissingTemplate);
    }

    Ok(())
}

/// Apply a field-level update to a recurring template.
///
/// If the update shrinks the occurrence cap (a bounded cap replacing an
/// unbounded one, or a smaller bounded cap), the retraction engine runs in
/// the same SQL transaction and removes the generated transactions that fall
/// beyond the new cap. Growing the cap never regenerates missed occurrences.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTemplate] if `id` does not refer to a valid
///   template,
/// - or [Error::InvalidFrequency] / [Error::InvalidOccurrenceCap] if the
///   update contains invalid parameters,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_template(
    id: TemplateId,
    update: TemplateUpdate,
    connection: &Connection,
) -> Result<RecurringTemplate, Error> {
    let tx = connection.unchecked_transaction()?;

    let existing = get_template(id, &tx).map_err(|error| match error {
        Error::NotFound => Error::UpdateMissingTemplate,
        error => error,
    })?;

    let frequency_days = update.frequency_days.unwrap_or(existing.frequency_days);
    let new_cap = update.total_occurrences.unwrap_or(existing.total_occurrences);
    validate(frequency_days, new_cap)?;

    let start_date = update.start_date.unwrap_or(existing.start_date);
    let vendor = update.vendor.unwrap_or(existing.vendor);
    let category = update.category.unwrap_or(existing.category);
    let amount = update.amount.unwrap_or(existing.amount);
    let notes = update.notes.unwrap_or(existing.notes);
    let next_due_date = update.next_due_date.unwrap_or(existing.next_due_date);

    tx.execute(
        "UPDATE recurring_template
         SET start_date = ?1, vendor = ?2, category = ?3, amount = ?4, notes = ?5,
             next_due_date = ?6, frequency_days = ?7, total_occurrences = ?8
         WHERE id = ?9",
        (
            start_date,
            &vendor,
            &category,
            amount.to_string(),
            &notes,
            next_due_date,
            frequency_days,
            new_cap,
            id,
        ),
    )?;

    // A shrinking cap is always bounded.
    if let Some(cap) = new_cap
        && needs_retraction(existing.total_occurrences, new_cap)
    {
        let template = get_template(id, &tx)?;
        retract_excess(&template, cap, &tx)?;
    }

    let template = get_template(id, &tx)?;
    tx.commit()?;

    Ok(template)
}

/// Delete a recurring template.
///
/// Depending on `mode`, its generated transactions are either deleted too
/// (with their amounts reversed from the account balance) or kept and
/// unlinked. Either way no transaction is left pointing at a template that
/// no longer exists.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTemplate] if `id` does not refer to a valid
///   template,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_template(
    id: TemplateId,
    mode: TemplateDeletion,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    get_template(id, &tx).map_err(|error| match error {
        Error::NotFound => Error::DeleteMissingTemplate,
        error => error,
    })?;

    match mode {
        TemplateDeletion::Cascade => {
            for transaction in get_linked_transactions(id, &tx)? {
                reverse_from_balance(transaction.account_id, transaction.amount, &tx)?;
            }
            tx.execute(
                "DELETE FROM \"transaction\" WHERE source_template_id = ?1",
                (id,),
            )?;
        }
        TemplateDeletion::Unlink => {
            tx.execute(
                "UPDATE \"transaction\" SET source_template_id = NULL WHERE source_template_id = ?1",
                (id,),
            )?;
        }
    }

    tx.execute("DELETE FROM recurring_template WHERE id = ?1", (id,))?;

    tx.commit()?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod delete_template_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        account::{create_account, get_balance},
        db::initialize,
        recurring::generate_due,
        transaction::get_account_transactions,
    };

    use super::{RecurringTemplate, TemplateDeletion, create_template, delete_template, get_template};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn cascade_deletes_generated_transactions_and_reverses_balance() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-100.00), date!(2025 - 01 - 01), "Gym"),
            &conn,
        )
        .unwrap();
        generate_due(template.id, date!(2025 - 03 - 02), &conn).unwrap();
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(-300.00)));

        delete_template(template.id, TemplateDeletion::Cascade, &conn)
            .expect("Could not delete template");

        assert_eq!(get_template(template.id, &conn), Err(Error::NotFound));
        assert_eq!(get_account_transactions(account.id, &conn), Ok(Vec::new()));
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(0.00)));
    }

    #[test]
    fn unlink_keeps_transactions_and_balance() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-100.00), date!(2025 - 01 - 01), "Gym"),
            &conn,
        )
        .unwrap();
        generate_due(template.id, date!(2025 - 03 - 02), &conn).unwrap();

        delete_template(template.id, TemplateDeletion::Unlink, &conn)
            .expect("Could not delete template");

        let transactions = get_account_transactions(account.id, &conn).unwrap();
        assert_eq!(transactions.len(), 3);
        assert!(
            transactions
                .iter()
                .all(|transaction| transaction.source_template_id.is_none())
        );
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(-300.00)));
    }

    #[test]
    fn delete_missing_template_fails() {
        let conn = get_test_connection();

        let result = delete_template(42, TemplateDeletion::Cascade, &conn);

        assert_eq!(result, Err(Error::DeleteMissingTemplate));
    }
}

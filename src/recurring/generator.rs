//! The occurrence generator.
//!
//! Walks a recurring template's due dates up to a reference date (typically
//! today) and materialises each one as a one-time transaction linked back to
//! the template, applying each amount to the account balance as it goes.
//! The walk is deterministic: the produced occurrence dates are exactly
//! `next_due_date, next_due_date + frequency, ...` up to the reference date
//! and the occurrence cap.

use rusqlite::Connection;
use time::{Date, Duration};

use crate::{
    Error,
    account::get_all_accounts,
    database_id::{AccountId, TemplateId},
    recurring::core::{get_account_templates, get_template, store_generation_state},
    transaction::{Transaction, insert_transaction},
};

/// Generate every due occurrence of a template as of `reference_date`.
///
/// Each occurrence becomes a transaction dated on its due date, with the
/// template's vendor, category and amount, notes marked as auto-generated,
/// and a link back to the template. The template's `next_due_date` and
/// `generated_count` advance accordingly. A bounded template stops at its
/// cap even if more dates are due; those dates are forfeited, not deferred.
///
/// The whole pass is one SQL transaction: either every due occurrence and
/// the template's new cursor commit together, or nothing does.
///
/// Returns the number of transactions created (0 if none were due).
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `template_id` does not refer to a valid template,
/// - or [Error::InvalidFrequency] if the stored template has a non-positive
///   frequency (possible only if the row was edited outside the
///   application),
/// - or [Error::SqlError] there is some other SQL error.
pub fn generate_due(
    template_id: TemplateId,
    reference_date: Date,
    connection: &Connection,
) -> Result<u32, Error> {
    let tx = connection.unchecked_transaction()?;
    let generated = generate_due_within(template_id, reference_date, &tx)?;
    tx.commit()?;

    Ok(generated)
}

fn generate_due_within(
    template_id: TemplateId,
    reference_date: Date,
    connection: &Connection,
) -> Result<u32, Error> {
    let mut template = get_template(template_id, connection)?;

    // The loop below only terminates if the due date strictly increases.
    if template.frequency_days <= 0 {
        return Err(Error::InvalidFrequency(template.frequency_days));
    }

    let mut generated = 0;

    while template.next_due_date <= reference_date
        && template
            .total_occurrences
            .is_none_or(|cap| template.generated_count < cap)
    {
        insert_transaction(
            Transaction::build(
                template.account_id,
                template.amount,
                template.next_due_date,
                &template.vendor,
            )
            .category(&template.category)
            .notes(&format!("Auto-generated: {}", template.notes))
            .source_template(template.id),
            connection,
        )?;

        template.next_due_date += Duration::days(template.frequency_days);
        template.generated_count += 1;
        generated += 1;
    }

    if generated > 0 {
        store_generation_state(&template, connection)?;
        tracing::debug!(
            "generated {generated} transactions for template {template_id}, next due {}",
            template.next_due_date
        );
    }

    Ok(generated)
}

/// Generate due occurrences for every template on an account.
///
/// Each template runs as its own atomic unit; a template that disappears
/// between listing and generation is skipped with a warning rather than
/// aborting the rest of the account.
///
/// Returns the total number of transactions created.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn generate_due_for_account(
    account_id: AccountId,
    reference_date: Date,
    connection: &Connection,
) -> Result<u32, Error> {
    let templates = get_account_templates(account_id, connection)?;
    let mut total = 0;

    for template in templates {
        match generate_due(template.id, reference_date, connection) {
            Ok(generated) => total += generated,
            Err(Error::NotFound) => {
                tracing::warn!(
                    "skipping recurring template {}: no longer in the database",
                    template.id
                );
            }
            Err(error) => return Err(error),
        }
    }

    Ok(total)
}

/// Generate due occurrences for every template on every account.
///
/// This is the triggering entry point for callers that process recurring
/// transactions at a defined moment, e.g. when the user opens the
/// application. Returns the total number of transactions created, for
/// reporting upward.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn run_recurring_sweep(reference_date: Date, connection: &Connection) -> Result<u32, Error> {
    let mut total = 0;

    for account in get_all_accounts(connection)? {
        total += generate_due_for_account(account.id, reference_date, connection)?;
    }

    if total > 0 {
        tracing::info!("recurring sweep generated {total} transactions");
    }

    Ok(total)
}

// ============================================================================
// TESTS
// ============================================================================

//! The retraction engine.
//!
//! When a template's occurrence cap shrinks, the transactions generated
//! beyond the new cap become excess: each one has its amount reversed from
//! the account balance and is then deleted, restoring the invariant that the
//! balance equals the sum of the surviving transactions.
//!
//! The cutoff is the date of the last occurrence that should survive,
//! `start_date + frequency_days * (new_cap - 1)` (occurrences are
//! zero-indexed from the start date). Generated transactions dated strictly
//! after the cutoff are removed; the one dated exactly on it survives.

use rusqlite::Connection;
use time::Duration;

use crate::{
    Error,
    account::reverse_from_balance,
    database_id::TemplateId,
    recurring::core::{OccurrenceCap, RecurringTemplate, get_template, store_generation_state},
    transaction::{count_linked_transactions, get_linked_transactions_after},
};

/// Whether replacing `old_cap` with `new_cap` requires retracting generated
/// transactions.
///
/// Only a shrinking cap does: a bounded cap replacing an unbounded one, or a
/// smaller bounded cap replacing a larger one. Removing or growing a cap
/// never deletes anything, and never regenerates occurrences that were
/// skipped while the cap was lower.
pub fn needs_retraction(old_cap: OccurrenceCap, new_cap: OccurrenceCap) -> bool {
    match (old_cap, new_cap) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new < old,
    }
}

/// Reconcile a template's generated transactions after its occurrence cap
/// was edited from `old_cap` to `new_cap`.
///
/// Callers editing a template through [crate::recurring::update_template]
/// get this for free; this entry point exists for edit flows that update the
/// template row themselves and must expect the row to already hold the new
/// parameters.
///
/// Does nothing unless the cap shrank (see [needs_retraction]). Invoking it
/// twice with the same state deletes transactions only on the first call.
///
/// Returns the number of transactions retracted.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `template_id` does not refer to a valid template,
/// - or [Error::SqlError] there is some other SQL error.
pub fn reconcile_after_edit(
    template_id: TemplateId,
    old_cap: OccurrenceCap,
    new_cap: OccurrenceCap,
    connection: &Connection,
) -> Result<u32, Error> {
    // A shrinking cap is always bounded.
    let cap = match new_cap {
        Some(cap) if needs_retraction(old_cap, new_cap) => cap,
        _ => return Ok(0),
    };

    let tx = connection.unchecked_transaction()?;
    let template = get_template(template_id, &tx)?;
    let retracted = retract_excess(&template, cap, &tx)?;
    tx.commit()?;

    Ok(retracted)
}

/// Delete the transactions generated beyond `cap` and reverse their balance
/// impact, without opening an SQL transaction. The caller is responsible for
/// atomicity.
///
/// When transactions were removed, the template's cursor is reset so the
/// numbering stays consistent: `generated_count` becomes the number of
/// surviving linked transactions plus one, and `next_due_date` is re-derived
/// from it. When nothing fell beyond the cutoff the cursor is left alone.
pub(crate) fn retract_excess(
    template: &RecurringTemplate,
    cap: u32,
    connection: &Connection,
) -> Result<u32, Error> {
    let cutoff_date =
        template.start_date + Duration::days(template.frequency_days * (i64::from(cap) - 1));

    let excess = get_linked_transactions_after(template.id, cutoff_date, connection)?;
    if excess.is_empty() {
        return Ok(0);
    }

    for transaction in &excess {
        reverse_from_balance(transaction.account_id, transaction.amount, connection)?;
    }

    connection.execute(
        "DELETE FROM \"transaction\" WHERE source_template_id = ?1 AND date > ?2",
        (template.id, cutoff_date),
    )?;

    let remaining = count_linked_transactions(template.id, connection)?;
    let generated_count = remaining + 1;
    let next_due_date = template.start_date
        + Duration::days(template.frequency_days * i64::from(generated_count));

    store_generation_state(
        &RecurringTemplate {
            next_due_date,
            generated_count,
            ..template.clone()
        },
        connection,
    )?;

    tracing::debug!(
        "retracted {} transactions past {cutoff_date} for template {}",
        excess.len(),
        template.id
    );

    Ok(excess.len() as u32)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod retraction_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::{Duration, macros::date};

    use crate::{
        account::{create_account, get_balance},
        db::initialize,
        recurring::{
            RecurringTemplate, TemplateUpdate, create_template, generate_due, get_template,
            update_template,
        },
        transaction::get_account_transactions,
    };

    use super::{needs_retraction, reconcile_after_edit};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn shrinking_cap_is_detected() {
        assert!(needs_retraction(None, Some(12)));
        assert!(needs_retraction(Some(26), Some(12)));
        assert!(!needs_retraction(Some(12), Some(12)));
        assert!(!needs_retraction(Some(12), Some(26)));
        assert!(!needs_retraction(Some(12), None));
        assert!(!needs_retraction(None, None));
    }

    #[test]
    fn shrinking_the_cap_retracts_excess_occurrences() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let start = date!(2023 - 01 - 01);
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-900.00), start, "Landlord")
                .category("Housing")
                .notes("Monthly rent"),
            &conn,
        )
        .unwrap();

        // 755 days of history: occurrences 0..=25 are due.
        let generated = generate_due(template.id, start + Duration::days(755), &conn).unwrap();
        assert_eq!(generated, 26);
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(-23400.00)));

        let updated = update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(12)),
                ..Default::default()
            },
            &conn,
        )
        .expect("Could not update template");

        let transactions = get_account_transactions(account.id, &conn).unwrap();
        assert_eq!(transactions.len(), 12);
        assert_eq!(get_balance(account.id, &conn), Ok(dec!(-10800.00)));

        // The 12th occurrence (index 11) is the last survivor.
        let newest = transactions
            .iter()
            .map(|transaction| transaction.date)
            .max()
            .unwrap();
        assert_eq!(newest, start + Duration::days(30 * 11));

        assert_eq!(updated.generated_count, 13);
        assert_eq!(updated.next_due_date, start + Duration::days(30 * 13));
    }

    #[test]
    fn retraction_is_idempotent() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let start = date!(2023 - 01 - 01);
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-900.00), start, "Landlord"),
            &conn,
        )
        .unwrap();
        generate_due(template.id, start + Duration::days(755), &conn).unwrap();
        update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(12)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let balance_after_first = get_balance(account.id, &conn).unwrap();

        let retracted = reconcile_after_edit(template.id, None, Some(12), &conn).unwrap();

        assert_eq!(retracted, 0);
        assert_eq!(get_balance(account.id, &conn), Ok(balance_after_first));
        assert_eq!(
            get_account_transactions(account.id, &conn).unwrap().len(),
            12
        );
        assert_eq!(get_template(template.id, &conn).unwrap().generated_count, 13);
    }

    #[test]
    fn growing_the_cap_deletes_nothing() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-50.00), date!(2025 - 01 - 01), "Gym")
                .total_occurrences(Some(3)),
            &conn,
        )
        .unwrap();
        generate_due(template.id, date!(2025 - 12 - 31), &conn).unwrap();

        let retracted = reconcile_after_edit(template.id, Some(3), Some(10), &conn).unwrap();

        assert_eq!(retracted, 0);
        assert_eq!(
            get_account_transactions(account.id, &conn).unwrap().len(),
            3
        );
    }

    #[test]
    fn removing_the_cap_deletes_nothing() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-50.00), date!(2025 - 01 - 01), "Gym")
                .total_occurrences(Some(3)),
            &conn,
        )
        .unwrap();
        generate_due(template.id, date!(2025 - 12 - 31), &conn).unwrap();

        let retracted = reconcile_after_edit(template.id, Some(3), None, &conn).unwrap();

        assert_eq!(retracted, 0);
    }

    #[test]
    fn shrink_with_no_excess_keeps_the_cursor() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let start = date!(2025 - 01 - 01);
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-50.00), start, "Gym"),
            &conn,
        )
        .unwrap();

        // Only 5 occurrences have happened; a cap of 12 cuts nothing off.
        generate_due(template.id, start + Duration::days(125), &conn).unwrap();

        update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(12)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        let template = get_template(template.id, &conn).unwrap();
        assert_eq!(template.generated_count, 5);
        assert_eq!(template.next_due_date, start + Duration::days(30 * 5));
        assert_eq!(
            get_account_transactions(account.id, &conn).unwrap().len(),
            5
        );
    }

    #[test]
    fn raising_the_cap_resumes_from_the_cursor() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let start = date!(2024 - 01 - 01);
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-50.00), start, "Gym")
                .total_occurrences(Some(3)),
            &conn,
        )
        .unwrap();
        generate_due(template.id, date!(2025 - 12 - 31), &conn).unwrap();

        update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(5)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let generated = generate_due(template.id, date!(2025 - 12 - 31), &conn).unwrap();

        assert_eq!(generated, 2);
        let dates: Vec<_> = get_account_transactions(account.id, &conn)
            .unwrap()
            .iter()
            .map(|transaction| transaction.date)
            .collect();
        assert_eq!(dates.len(), 5);
        // Occurrences 3 and 4 follow directly on from the first three.
        assert!(dates.contains(&(start + Duration::days(30 * 3))));
        assert!(dates.contains(&(start + Duration::days(30 * 4))));
    }

    #[test]
    fn occurrences_cut_off_by_retraction_are_not_regenerated() {
        let conn = get_test_connection();
        let account = create_account("Checking", &conn).unwrap();
        let start = date!(2023 - 01 - 01);
        let template = create_template(
            RecurringTemplate::build(account.id, dec!(-900.00), start, "Landlord"),
            &conn,
        )
        .unwrap();
        generate_due(template.id, start + Duration::days(755), &conn).unwrap();
        update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(12)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        // Raising the cap to 14 allows one more occurrence (the cursor is at
        // 13), but occurrence 12 stays forfeited.
        update_template(
            template.id,
            TemplateUpdate {
                total_occurrences: Some(Some(14)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let generated = generate_due(template.id, start + Duration::days(755), &conn).unwrap();

        assert_eq!(generated, 1);
        let dates: Vec<_> = get_account_transactions(account.id, &conn)
            .unwrap()
            .iter()
            .map(|transaction| transaction.date)
            .collect();
        assert_eq!(dates.len(), 13);
        assert!(!dates.contains(&(start + Duration::days(30 * 12))));
        assert!(dates.contains(&(start + Duration::days(30 * 13))));
    }
}

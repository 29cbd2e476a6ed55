//! Whole-account JSON snapshots.
//!
//! A snapshot bundles an account with its transactions and recurring
//! templates into one serialisable value, so an account can be moved between
//! databases (backup, restore, import into a fresh install). Importing
//! re-links generated transactions to the restored templates and preserves
//! each template's generation state.

use std::collections::HashMap;

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    account::{create_account, get_account, set_balance},
    database_id::{AccountId, TemplateId},
    recurring::{RecurringTemplate, get_account_templates, restore_template},
    transaction::{Transaction, get_account_transactions, restore_transaction},
};

use super::Account;

/// A self-contained copy of one account and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// The account's name.
    pub name: String,
    /// The account's balance at export time.
    pub balance: Decimal,
    /// All of the account's transactions, newest first.
    pub transactions: Vec<Transaction>,
    /// All of the account's recurring templates.
    pub recurring: Vec<RecurringTemplate>,
}

/// Export an account and everything it owns as a snapshot.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `account_id` does not refer to a valid account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn export_account(
    account_id: AccountId,
    connection: &Connection,
) -> Result<AccountSnapshot, Error> {
    let account = get_account(account_id, connection)?;
    let transactions = get_account_transactions(account_id, connection)?;
    let recurring = get_account_templates(account_id, connection)?;

    Ok(AccountSnapshot {
        name: account.name,
        balance: account.balance,
        transactions,
        recurring,
    })
}

/// Import a snapshot as a new account.
///
/// Templates are restored first so that generated transactions can be
/// re-linked to their new template IDs. The balance is taken from the
/// snapshot as-is rather than replayed transaction by transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateAccountName] if an account with the snapshot's name
///   already exists,
/// - or [Error::NotFound] if a transaction in the snapshot references a
///   template the snapshot does not contain,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn import_account(
    snapshot: &AccountSnapshot,
    connection: &Connection,
) -> Result<Account, Error> {
    let tx = connection.unchecked_transaction()?;

    let account = create_account(&snapshot.name, &tx)?;

    let mut template_ids: HashMap<TemplateId, TemplateId> = HashMap::new();

    for template in &snapshot.recurring {
        let restored = restore_template(template, account.id, &tx)?;
        template_ids.insert(template.id, restored.id);
    }

    // Oldest first, so ID order matches the original insertion order.
    for transaction in snapshot.transactions.iter().rev() {
        let source_template_id = match transaction.source_template_id {
            Some(old_id) => Some(*template_ids.get(&old_id).ok_or(Error::NotFound)?),
            None => None,
        };

        restore_transaction(transaction, account.id, source_template_id, &tx)?;
    }

    set_balance(account.id, snapshot.balance, &tx)?;

    let account = get_account(account.id, &tx)?;

    tx.commit()?;

    Ok(account)
}

// ============================================================================
// TESTS
// ============================================================================
